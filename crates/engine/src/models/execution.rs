//! Runtime records: `ExecutionRequest`, `Execution`, `NodeExecution`,
//! `StateTransition`, `ExecutionMetric` (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// An admission ticket submitted to the queue (spec.md §6, submit API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub priority: Priority,
    #[serde(default)]
    pub input_data: Value,
    #[serde(default)]
    pub metadata: Value,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub requestor_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
    pub requested_at: DateTime<Utc>,
}

impl ExecutionRequest {
    pub fn new(workflow_id: Uuid, priority: Priority, input_data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            priority,
            input_data,
            metadata: Value::Null,
            scheduled_at: None,
            requestor_id: None,
            idempotency_key: None,
            requested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Production,
    Test,
    Debug,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Test => "test",
            Self::Debug => "debug",
        }
    }
}

/// The execution state machine (spec.md §3).
///
/// `Paused` is a side-branch re-enterable from `Running`; every other
/// variant besides `Pending`/`Queued`/`Running`/`Paused` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        }
    }

    /// Once in a terminal state, an execution never leaves the terminal set.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout)
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "timeout" => Ok(Self::Timeout),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The durable run record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub mode: ExecutionMode,
    pub trigger_type: String,
    pub priority: Priority,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub execution_time_ms: Option<i64>,
    pub input: Value,
    pub output: Value,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub retry_count: u32,
    pub retry_of: Option<Uuid>,
    pub creator_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Execution {
    /// The execution's id is the admission request's id, not a fresh one —
    /// callers that submitted the request (the API, a webhook, the
    /// scheduler) poll this same id once the orchestrator picks it up.
    pub fn new(workflow_id: Uuid, request: &ExecutionRequest, trigger_type: impl Into<String>) -> Self {
        Self {
            id: request.id,
            workflow_id,
            status: ExecutionStatus::Pending,
            mode: ExecutionMode::Production,
            trigger_type: trigger_type.into(),
            priority: request.priority,
            started_at: None,
            finished_at: None,
            execution_time_ms: None,
            input: request.input_data.clone(),
            output: Value::Null,
            error: None,
            error_code: None,
            retry_count: 0,
            retry_of: None,
            creator_id: request.requestor_id,
            idempotency_key: request.idempotency_key.clone(),
            created_at: Utc::now(),
        }
    }

    /// Compute `execution_time_ms` to millisecond precision once both
    /// timestamps are known. Does not mutate; callers assign the result.
    pub fn compute_duration_ms(started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> i64 {
        (finished_at - started_at).num_milliseconds()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl NodeExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped | Self::Cancelled)
    }
}

impl std::fmt::Display for NodeExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One record per node attempt inside a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecution {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub status: NodeExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub execution_time_ms: Option<i64>,
    pub input: Value,
    pub output: Value,
    pub error: Option<String>,
    pub retry_count: u32,
    pub metadata: Value,
}

impl NodeExecution {
    pub fn new(execution_id: Uuid, node_id: impl Into<String>, input: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            node_id: node_id.into(),
            status: NodeExecutionStatus::Pending,
            started_at: None,
            finished_at: None,
            execution_time_ms: None,
            input,
            output: Value::Null,
            error: None,
            retry_count: 0,
            metadata: Value::Null,
        }
    }
}

/// Immutable audit entry. Transitions for one execution form a contiguous
/// chain whose `to_state` equals the next transition's `from_state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub from_state: String,
    pub to_state: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Value,
}

impl StateTransition {
    pub fn new(execution_id: Uuid, from_state: impl Into<String>, to_state: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            from_state: from_state.into(),
            to_state: to_state.into(),
            timestamp: Utc::now(),
            metadata: Value::Null,
        }
    }
}

/// A single point in a metric time-series (latency, memory, CPU, throughput).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetric {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: Option<String>,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionMetric {
    pub fn new(execution_id: Uuid, name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            node_id: None,
            name: name.into(),
            value,
            unit: unit.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn for_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }
}
