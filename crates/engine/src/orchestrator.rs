//! `Orchestrator` — drives a single workflow execution from admission
//! through its terminal state (spec.md §4.3).
//!
//! 1. create the `Execution` row, transition `pending` -> `running`
//! 2. build the `ExecutionGraph` and a per-run `VariableContext`
//! 3. compute the ready set for each parallel group (bounded by
//!    `max_concurrency`) and dispatch nodes concurrently
//! 4. on node success, store its output keyed by node id and unblock
//!    dependents once every dependency has completed
//! 5. on node failure, apply the retry/backoff policy, or honor
//!    `continue_on_fail`, or cascade-cancel the remaining graph
//! 6. propagate cancellation to in-flight node contexts
//! 7. transition to a terminal state and publish `execution.completed` /
//!    `execution.failed` / `execution.cancelled`

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use db::DbPool;
use nodes::{CancellationToken, ExecutionContext, NodeError};

use crate::dag;
use crate::error::{EngineError, ErrorCode};
use crate::models::execution::{Execution, ExecutionRequest, ExecutionStatus, NodeExecution, NodeExecutionStatus};
use crate::models::graph::ExecutionGraph;
use crate::models::variable::VariableContext;
use crate::models::workflow::Workflow;
use crate::registry::NodeRegistry;

/// Tuning knobs for the retry/backoff policy (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
    pub jitter_fraction: f64,
    pub max_concurrency_per_group: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(10),
            jitter_fraction: 0.1,
            max_concurrency_per_group: 16,
        }
    }
}

/// Published at each lifecycle step (spec.md §6 event-bus topics). The
/// orchestrator never holds a state-store transaction open across a
/// publish call.
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Value);
}

/// Drops every event. Useful for tests and for binaries that don't yet
/// wire a real bus.
#[derive(Default)]
pub struct NoopPublisher;

#[async_trait::async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _topic: &str, _payload: Value) {}
}

pub struct Orchestrator {
    pool: DbPool,
    registry: Arc<NodeRegistry>,
    config: OrchestratorConfig,
    events: Arc<dyn EventPublisher>,
    /// Idempotency-key -> execution id, collapsed for the lifetime of the
    /// process. A durable dedup table belongs to the `db` crate; this is
    /// the in-process fast path described in spec.md §4.3.
    inflight_keys: Mutex<HashMap<String, uuid::Uuid>>,
}

impl Orchestrator {
    pub fn new(pool: DbPool, registry: Arc<NodeRegistry>, config: OrchestratorConfig) -> Self {
        Self {
            pool,
            registry,
            config,
            events: Arc::new(NoopPublisher),
            inflight_keys: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    /// Run `workflow` for `request`, returning the completed `Execution`
    /// record. Never panics on node failure; failures are reported on the
    /// returned `Execution`, not as an `Err` — `Err` is reserved for
    /// conditions the caller must react to before an execution even exists
    /// (validation failure, a duplicate idempotency key under contention).
    #[instrument(skip(self, request), fields(workflow_id = %workflow.id))]
    pub async fn execute(
        &self,
        workflow: &Workflow,
        request: ExecutionRequest,
        cancellation: CancellationToken,
    ) -> Result<Execution, EngineError> {
        if let Some(key) = &request.idempotency_key {
            let mut keys = self.inflight_keys.lock().await;
            if let Some(existing) = keys.get(key) {
                return Err(EngineError::Internal(format!(
                    "idempotency key '{key}' already bound to execution {existing}"
                )));
            }
            keys.insert(key.clone(), request.id);
        }

        let (errors, warnings) = dag::validate(workflow);
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors));
        }
        for warning in &warnings {
            warn!(?warning, "workflow validation warning");
        }

        let order = dag::topological_order(workflow)?;
        let graph = ExecutionGraph::build(workflow, order);

        let execution_for_row = Execution::new(workflow.id, &request, "manual");
        db::repository::executions::create_execution(&self.pool, &execution_row(&execution_for_row)).await?;
        db::repository::executions::insert_initial_transition(&self.pool, execution_for_row.id, "pending").await?;

        let mut execution = execution_for_row;
        execution.status = ExecutionStatus::Running;
        execution.started_at = Some(Utc::now());
        db::repository::executions::start_execution(&self.pool, execution.id, execution.started_at.unwrap()).await?;
        self.events.publish("execution.started", serde_json::json!({
            "execution_id": execution.id,
            "workflow_id": workflow.id,
        })).await;

        let mut variables = VariableContext::new().with_workflow(Vec::new());
        variables.set_runtime("input", request.input_data.clone());

        let deadline = Utc::now() + chrono::Duration::minutes(30);
        let mut node_outputs: HashMap<String, Value> = HashMap::new();
        let mut completed: HashSet<String> = HashSet::new();
        let mut failed: HashSet<String> = HashSet::new();
        let mut skipped: HashSet<String> = HashSet::new();
        // The named port a condition/switch node emitted on (`branch` field
        // of its output), consulted before marking a dependent ready.
        let mut node_branch: HashMap<String, String> = HashMap::new();

        'groups: for group in &graph.parallel_groups {
            if cancellation.is_cancelled() {
                break 'groups;
            }

            let mut ready: Vec<&String> = Vec::with_capacity(group.nodes.len());
            for node_id in &group.nodes {
                if skipped.contains(node_id) {
                    continue;
                }
                if branch_routed_away(&graph, node_id.as_str(), &skipped, &node_branch) {
                    skipped.insert(node_id.clone());
                    cascade_skip(&graph, node_id.as_str(), &mut skipped);
                    continue;
                }
                ready.push(node_id);
            }
            if ready.is_empty() {
                continue;
            }

            let concurrency = group.max_concurrency.min(self.config.max_concurrency_per_group).max(1);
            for chunk in ready.chunks(concurrency) {
                let mut handles = Vec::with_capacity(chunk.len());

                for node_id in chunk {
                    let node = graph.node_map.get(node_id.as_str()).expect("node present in graph");
                    if node.disabled {
                        skipped.insert((*node_id).clone());
                        continue;
                    }

                    let upstream = merge_dependency_outputs(&graph, node_id.as_str(), &node_outputs, &request.input_data);
                    let Some(kernel) = self.registry.get(node.node_type.as_str()) else {
                        return Err(EngineError::UnknownNodeType(node.node_type.as_str().to_string()));
                    };

                    let ctx = ExecutionContext {
                        workflow_id: workflow.id,
                        execution_id: execution.id,
                        node_id: (*node_id).clone(),
                        parameters: node.parameters.clone(),
                        input: upstream,
                        secrets: HashMap::new(),
                        node_outputs: node_outputs.clone(),
                        deadline: Utc::now() + chrono::Duration::seconds(node.effective_timeout_seconds() as i64),
                        cancellation: cancellation.clone(),
                    };

                    let node_id = (*node_id).clone();
                    let retry_count = node.retry_count;
                    let continue_on_fail = node.continue_on_fail;
                    let backoff = self.config.clone();
                    let registry = kernel;
                    let node_started_at = Utc::now();
                    let node_input = ctx.input.clone();

                    self.events.publish("execution.node.started", serde_json::json!({
                        "execution_id": execution.id,
                        "node_id": node_id,
                    })).await;

                    handles.push(tokio::spawn(async move {
                        let input = ctx.input.clone();
                        let result = execute_with_retry(registry.as_ref(), input, &ctx, retry_count, &backoff).await;
                        (node_id, continue_on_fail, node_started_at, node_input, result)
                    }));
                }

                for handle in handles {
                    let (node_id, continue_on_fail, node_started_at, node_input, result) = handle
                        .await
                        .map_err(|e| EngineError::Internal(format!("node task panicked: {e}")))?;

                    let node_finished_at = Utc::now();
                    let duration_ms = Execution::compute_duration_ms(node_started_at, node_finished_at);

                    match result {
                        Ok(output) => {
                            info!(%node_id, "node completed");
                            if let Some(branch) = output.get("branch").and_then(Value::as_str) {
                                node_branch.insert(node_id.clone(), branch.to_string());
                            }
                            node_outputs.insert(node_id.clone(), output.clone());
                            completed.insert(node_id.clone());

                            let mut node_execution = NodeExecution::new(execution.id, node_id.clone(), node_input);
                            node_execution.status = NodeExecutionStatus::Completed;
                            node_execution.started_at = Some(node_started_at);
                            node_execution.finished_at = Some(node_finished_at);
                            node_execution.execution_time_ms = Some(duration_ms);
                            node_execution.output = output.clone();
                            self.persist_node_execution(&node_execution).await?;

                            self.events.publish("execution.node.completed", serde_json::json!({
                                "execution_id": execution.id,
                                "node_id": node_id,
                                "output": output,
                            })).await;
                        }
                        Err(NodeError::Cancelled) => {
                            warn!(%node_id, "node cancelled");
                            skipped.insert(node_id.clone());

                            let mut node_execution = NodeExecution::new(execution.id, node_id.clone(), node_input);
                            node_execution.status = NodeExecutionStatus::Cancelled;
                            node_execution.started_at = Some(node_started_at);
                            node_execution.finished_at = Some(node_finished_at);
                            node_execution.execution_time_ms = Some(duration_ms);
                            self.persist_node_execution(&node_execution).await?;
                        }
                        Err(err) if continue_on_fail => {
                            warn!(%node_id, %err, "node failed, continuing (continue_on_fail)");
                            failed.insert(node_id.clone());
                            node_outputs.insert(node_id.clone(), Value::Null);

                            let mut node_execution = NodeExecution::new(execution.id, node_id.clone(), node_input);
                            node_execution.status = NodeExecutionStatus::Failed;
                            node_execution.started_at = Some(node_started_at);
                            node_execution.finished_at = Some(node_finished_at);
                            node_execution.execution_time_ms = Some(duration_ms);
                            node_execution.error = Some(err.to_string());
                            self.persist_node_execution(&node_execution).await?;
                        }
                        Err(err) => {
                            error!(%node_id, %err, "node failed fatally, cancelling remaining graph");
                            failed.insert(node_id.clone());
                            cancellation.cancel();
                            cascade_skip(&graph, &node_id, &mut skipped);
                            execution.error = Some(err.to_string());
                            execution.error_code = Some(node_error_code(&err).as_str().to_string());

                            let mut node_execution = NodeExecution::new(execution.id, node_id.clone(), node_input);
                            node_execution.status = NodeExecutionStatus::Failed;
                            node_execution.started_at = Some(node_started_at);
                            node_execution.finished_at = Some(node_finished_at);
                            node_execution.execution_time_ms = Some(duration_ms);
                            node_execution.error = Some(err.to_string());
                            self.persist_node_execution(&node_execution).await?;

                            break 'groups;
                        }
                    }
                }
            }
        }

        let finished_at = Utc::now();
        execution.finished_at = Some(finished_at);
        execution.execution_time_ms = execution
            .started_at
            .map(|started| Execution::compute_duration_ms(started, finished_at));

        execution.status = if cancellation.is_cancelled() && execution.error.is_none() {
            ExecutionStatus::Cancelled
        } else if !failed.is_empty() && execution.error.is_some() {
            ExecutionStatus::Failed
        } else if Utc::now() >= deadline {
            ExecutionStatus::Timeout
        } else {
            ExecutionStatus::Completed
        };

        execution.output = node_outputs
            .get(graph.topological_order.last().map(String::as_str).unwrap_or_default())
            .cloned()
            .unwrap_or(Value::Null);

        db::repository::executions::transition_status(
            &self.pool,
            execution.id,
            execution.status.as_str(),
            execution.finished_at,
            execution.execution_time_ms,
            execution.error.as_deref(),
            execution.error_code.as_deref(),
        ).await?;

        if !execution.output.is_null() {
            if let Err(e) = db::repository::executions::set_output(&self.pool, execution.id, &execution.output).await {
                warn!(error = %e, "failed to persist execution output");
            }
        }

        let topic = match execution.status {
            ExecutionStatus::Completed => "execution.completed",
            ExecutionStatus::Cancelled => "execution.cancelled",
            _ => "execution.failed",
        };
        self.events.publish(topic, serde_json::json!({
            "execution_id": execution.id,
            "workflow_id": workflow.id,
            "status": execution.status.as_str(),
        })).await;

        if let Some(key) = &request.idempotency_key {
            self.inflight_keys.lock().await.remove(key);
        }

        Ok(execution)
    }

    async fn persist_node_execution(&self, node_execution: &NodeExecution) -> Result<(), EngineError> {
        db::repository::executions::insert_node_execution(&self.pool, &node_execution_row(node_execution)).await?;

        if let Some(duration_ms) = node_execution.execution_time_ms {
            let metric = crate::models::execution::ExecutionMetric::new(
                node_execution.execution_id,
                "execution_time",
                duration_ms as f64,
                "ms",
            )
            .for_node(node_execution.node_id.clone());
            if let Err(e) = db::repository::metrics::record_metrics(&self.pool, &[metric_row(&metric)]).await {
                warn!(error = %e, node_id = %node_execution.node_id, "failed to record node execution_time metric");
            }
        }

        Ok(())
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// One node execution, retried per the node's own `retry_count` with
/// exponential backoff and jitter (spec.md §4.3: 100ms initial, x2, 10s
/// cap, +-10% jitter). A `Fatal` or `Timeout`/`Cancelled` error never
/// retries.
async fn execute_with_retry(
    node: &dyn nodes::ExecutableNode,
    input: Value,
    ctx: &ExecutionContext,
    max_retries: u32,
    config: &OrchestratorConfig,
) -> Result<Value, NodeError> {
    let mut attempt = 0u32;
    loop {
        if ctx.cancellation.is_cancelled() {
            return Err(NodeError::Cancelled);
        }
        if ctx.is_expired() {
            return Err(NodeError::Timeout);
        }

        match node.execute(input.clone(), ctx).await {
            Ok(output) => return Ok(output),
            Err(err) if err.is_retryable() && attempt < max_retries => {
                attempt += 1;
                let delay = backoff_delay(attempt, config);
                warn!(node_id = %ctx.node_id, attempt, ?delay, "retrying node after retryable error");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff_delay(attempt: u32, config: &OrchestratorConfig) -> Duration {
    let base = config.initial_backoff.as_secs_f64() * config.backoff_multiplier.powi(attempt as i32 - 1);
    let capped = base.min(config.max_backoff.as_secs_f64());
    let jitter_range = capped * config.jitter_fraction;
    let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
    Duration::from_secs_f64((capped + jitter).max(0.0))
}

fn node_error_code(err: &NodeError) -> ErrorCode {
    match err {
        NodeError::Retryable(_) => ErrorCode::RetryableIo,
        NodeError::Fatal(_) => ErrorCode::NodeFailed,
        NodeError::Timeout => ErrorCode::Timeout,
        NodeError::Cancelled => ErrorCode::Cancelled,
    }
}

/// A node with exactly one dependency receives that dependency's output
/// verbatim; a node with multiple dependencies (a `merge` target) receives
/// `{"branches": [...]}` — the shape `MergeNode` reads its inputs from — in
/// dependency-list order. A node with no dependencies (an entry point)
/// receives the request's raw input payload.
fn merge_dependency_outputs(
    graph: &ExecutionGraph,
    node_id: &str,
    node_outputs: &HashMap<String, Value>,
    request_input: &Value,
) -> Value {
    let deps = graph.dependencies_of(node_id);
    match deps {
        [] => request_input.clone(),
        [only] => node_outputs.get(only).cloned().unwrap_or(Value::Null),
        many => serde_json::json!({
            "branches": many
                .iter()
                .map(|id| node_outputs.get(id).cloned().unwrap_or(Value::Null))
                .collect::<Vec<_>>(),
        }),
    }
}

/// True when every incoming connection into `node_id` comes from either an
/// already-skipped source, or a completed condition/switch node whose
/// emitted `branch` doesn't match that connection's `source_port` (spec.md
/// §4.3 step 4: "Split-node outputs flow only to successors on the matching
/// named port; condition-node outputs flow only on the true or false
/// port"). A node with no incoming connections (an entry point), or with at
/// least one connection that is still viable, is never routed away.
fn branch_routed_away(
    graph: &ExecutionGraph,
    node_id: &str,
    skipped: &HashSet<String>,
    node_branch: &HashMap<String, String>,
) -> bool {
    let incoming = graph.incoming_of(node_id);
    if incoming.is_empty() {
        return false;
    }

    incoming.iter().all(|conn| {
        if skipped.contains(&conn.source) {
            return true;
        }
        match node_branch.get(&conn.source) {
            Some(branch) => branch != &conn.source_port,
            None => false,
        }
    })
}

/// Mark every transitive dependent of `node_id` as skipped, so a fatal
/// failure never leaves a dangling node waiting on an output that will
/// never arrive.
fn cascade_skip(graph: &ExecutionGraph, node_id: &str, skipped: &mut HashSet<String>) {
    let mut stack = vec![node_id.to_string()];
    while let Some(current) = stack.pop() {
        for dependent in graph.dependents_of(&current) {
            if skipped.insert(dependent.clone()) {
                stack.push(dependent.clone());
            }
        }
    }
}

fn execution_row(execution: &Execution) -> db::models::ExecutionRow {
    db::models::ExecutionRow {
        id: execution.id,
        workflow_id: execution.workflow_id,
        status: execution.status.as_str().to_string(),
        mode: execution.mode.as_str().to_string(),
        trigger_type: execution.trigger_type.clone(),
        priority: execution.priority.as_str().to_string(),
        started_at: execution.started_at,
        finished_at: execution.finished_at,
        execution_time_ms: execution.execution_time_ms,
        input: execution.input.clone(),
        output: execution.output.clone(),
        error: execution.error.clone(),
        error_code: execution.error_code.clone(),
        retry_count: execution.retry_count as i32,
        retry_of: execution.retry_of,
        creator_id: execution.creator_id,
        idempotency_key: execution.idempotency_key.clone(),
        created_at: execution.created_at,
    }
}

fn node_execution_row(node_execution: &NodeExecution) -> db::models::NodeExecutionRow {
    db::models::NodeExecutionRow {
        id: node_execution.id,
        execution_id: node_execution.execution_id,
        node_id: node_execution.node_id.clone(),
        status: node_execution.status.as_str().to_string(),
        started_at: node_execution.started_at,
        finished_at: node_execution.finished_at,
        execution_time_ms: node_execution.execution_time_ms,
        input: node_execution.input.clone(),
        output: node_execution.output.clone(),
        error: node_execution.error.clone(),
        retry_count: node_execution.retry_count as i32,
        metadata: node_execution.metadata.clone(),
    }
}

fn metric_row(metric: &crate::models::execution::ExecutionMetric) -> db::models::ExecutionMetricRow {
    db::models::ExecutionMetricRow {
        id: metric.id,
        execution_id: metric.execution_id,
        node_id: metric.node_id.clone(),
        name: metric.name.clone(),
        value: metric.value,
        unit: metric.unit.clone(),
        timestamp: metric.timestamp,
    }
}

/// Adapts the durable broadcast bus so the orchestrator can publish through
/// the same trait object it uses in tests, without `db` depending on
/// `engine` (orphan-rule: the trait lives here, the foreign type in `db`).
#[async_trait::async_trait]
impl EventPublisher for db::EventBus {
    async fn publish(&self, topic: &str, payload: Value) {
        db::EventBus::publish(self, topic, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_geometrically_and_respects_cap() {
        let config = OrchestratorConfig { jitter_fraction: 0.0, ..Default::default() };
        let first = backoff_delay(1, &config);
        let second = backoff_delay(2, &config);
        assert_eq!(first, Duration::from_millis(100));
        assert_eq!(second, Duration::from_millis(200));
        let much_later = backoff_delay(20, &config);
        assert_eq!(much_later, config.max_backoff);
    }

    #[test]
    fn merge_dependency_outputs_passes_single_dep_verbatim() {
        let workflow = Workflow::new(
            "t",
            uuid::Uuid::new_v4(),
            vec![
                crate::models::workflow::Node {
                    id: "a".into(),
                    node_type: crate::models::workflow::NodeType::Trigger,
                    position: Default::default(),
                    parameters: Value::Null,
                    retry_count: 0,
                    timeout_seconds: None,
                    disabled: false,
                    continue_on_fail: false,
                },
                crate::models::workflow::Node {
                    id: "b".into(),
                    node_type: crate::models::workflow::NodeType::Set,
                    position: Default::default(),
                    parameters: Value::Null,
                    retry_count: 0,
                    timeout_seconds: None,
                    disabled: false,
                    continue_on_fail: false,
                },
            ],
            vec![crate::models::workflow::Connection {
                source: "a".into(),
                target: "b".into(),
                source_port: "output".into(),
                target_port: "input".into(),
                data: None,
            }],
        );
        let order = dag::topological_order(&workflow).unwrap();
        let graph = ExecutionGraph::build(&workflow, order);
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), serde_json::json!({"x": 1}));
        let resolved = merge_dependency_outputs(&graph, "b", &outputs, &Value::Null);
        assert_eq!(resolved, serde_json::json!({"x": 1}));
    }

    fn node(id: &str, node_type: crate::models::workflow::NodeType) -> crate::models::workflow::Node {
        crate::models::workflow::Node {
            id: id.into(),
            node_type,
            position: Default::default(),
            parameters: Value::Null,
            retry_count: 0,
            timeout_seconds: None,
            disabled: false,
            continue_on_fail: false,
        }
    }

    fn connection(source: &str, target: &str, source_port: &str) -> crate::models::workflow::Connection {
        crate::models::workflow::Connection {
            source: source.into(),
            target: target.into(),
            source_port: source_port.into(),
            target_port: "input".into(),
            data: None,
        }
    }

    #[test]
    fn merge_dependency_outputs_wraps_multiple_deps_as_branches() {
        use crate::models::workflow::NodeType;

        let workflow = Workflow::new(
            "t",
            uuid::Uuid::new_v4(),
            vec![node("a", NodeType::Set), node("b", NodeType::Set), node("m", NodeType::Merge)],
            vec![connection("a", "m", "output"), connection("b", "m", "output")],
        );
        let order = dag::topological_order(&workflow).unwrap();
        let graph = ExecutionGraph::build(&workflow, order);
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), serde_json::json!(1));
        outputs.insert("b".to_string(), serde_json::json!(2));
        let resolved = merge_dependency_outputs(&graph, "m", &outputs, &Value::Null);
        assert_eq!(resolved, serde_json::json!({"branches": [1, 2]}));
    }

    #[test]
    fn branch_routed_away_skips_non_taken_port() {
        use crate::models::workflow::NodeType;

        let workflow = Workflow::new(
            "t",
            uuid::Uuid::new_v4(),
            vec![node("c", NodeType::Condition), node("t_branch", NodeType::Set), node("f_branch", NodeType::Set)],
            vec![connection("c", "t_branch", "true"), connection("c", "f_branch", "false")],
        );
        let order = dag::topological_order(&workflow).unwrap();
        let graph = ExecutionGraph::build(&workflow, order);

        let skipped = HashSet::new();
        let mut node_branch = HashMap::new();
        node_branch.insert("c".to_string(), "true".to_string());

        assert!(!branch_routed_away(&graph, "t_branch", &skipped, &node_branch));
        assert!(branch_routed_away(&graph, "f_branch", &skipped, &node_branch));
    }
}
