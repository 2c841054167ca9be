//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Domain types live in the `engine` crate; repository functions convert
//! between the two at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub team_id: Option<Uuid>,
    pub name: String,
    pub version: i64,
    pub is_active: bool,
    /// Full JSON workflow definition (nodes, connections, tags, settings).
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowVersionRow {
    pub workflow_id: Uuid,
    pub version: i64,
    pub snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// executions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: String,
    pub mode: String,
    pub trigger_type: String,
    pub priority: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub execution_time_ms: Option<i64>,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub retry_count: i32,
    pub retry_of: Option<Uuid>,
    pub creator_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NodeExecutionRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub execution_time_ms: Option<i64>,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub error: Option<String>,
    pub retry_count: i32,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StateTransitionRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub from_state: String,
    pub to_state: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// One entry in a merged execution timeline: either a state transition or a
/// node-execution start/finish event, carried with the timestamp used to
/// interleave the two streams (spec.md §4.5 "Timeline").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineEvent {
    Transition { timestamp: DateTime<Utc>, from_state: String, to_state: String },
    NodeStarted { timestamp: DateTime<Utc>, node_id: String },
    NodeFinished { timestamp: DateTime<Utc>, node_id: String, status: String },
}

impl TimelineEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TimelineEvent::Transition { timestamp, .. } => *timestamp,
            TimelineEvent::NodeStarted { timestamp, .. } => *timestamp,
            TimelineEvent::NodeFinished { timestamp, .. } => *timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionMetricRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: Option<String>,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

/// Daily rollup of metrics older than the retention window (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MetricRollupRow {
    pub id: Uuid,
    pub name: String,
    pub bucket_date: chrono::NaiveDate,
    pub count: i64,
    pub min_value: f64,
    pub mean_value: f64,
    pub max_value: f64,
}

// ---------------------------------------------------------------------------
// secrets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SecretRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub key: String,
    /// AES-256 encrypted value (base64-encoded ciphertext).
    pub encrypted_value: String,
}

// ---------------------------------------------------------------------------
// triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TriggerRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub kind: serde_json::Value,
    pub status: String,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub fire_count: i64,
    pub error_count: i64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// queue (durable mirror backing the in-memory priority tiers)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueueItemRow {
    /// Logical key, `queue:item:{id}` (spec.md §6 "Durable queue keys").
    pub item_key: String,
    pub priority: String,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueueSnapshotRow {
    /// `queue:high` | `queue:normal` | `queue:low`.
    pub tier_key: String,
    pub items: serde_json::Value,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeadLetterRow {
    pub id: Uuid,
    pub request: serde_json::Value,
    pub error: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// archive
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ArchiveMetadataRow {
    pub id: Uuid,
    pub bucket_date: chrono::NaiveDate,
    pub execution_count: i64,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}
