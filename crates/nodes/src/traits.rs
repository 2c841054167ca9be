//! The `ExecutableNode` trait — the contract every node must fulfil.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::NodeError;

/// Cooperative cancellation flag shared between the orchestrator and every
/// in-flight node context for one execution. Checked by nodes at iteration
/// and I/O boundaries rather than used to forcibly abort a task, so a node
/// always gets a chance to unwind cleanly (spec's 100 ms propagation budget
/// is met by checking this flag, not by killing the task).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shared context passed to every node during execution.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// ID of the parent workflow.
    pub workflow_id: uuid::Uuid,
    /// ID of the current execution run.
    pub execution_id: uuid::Uuid,
    /// ID of the node currently executing.
    pub node_id: String,
    /// This node's configured parameters (the node definition's
    /// `parameters` field, as authored on the workflow graph).
    pub parameters: Value,
    /// Initial input supplied when the execution was triggered.
    pub input: Value,
    /// Decrypted secrets scoped to this workflow.
    pub secrets: std::collections::HashMap<String, String>,
    /// Outputs of already-completed nodes, keyed by node id, for
    /// `{{nodeId.field}}` resolution.
    pub node_outputs: std::collections::HashMap<String, Value>,
    /// Wall-clock instant this node must finish by (node `timeout_seconds`,
    /// defaulted per [`crate::expr`]'s callers — see
    /// `engine::models::Node::effective_timeout_seconds`).
    pub deadline: DateTime<Utc>,
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn time_remaining(&self) -> chrono::Duration {
        self.deadline - Utc::now()
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.deadline
    }
}

/// The core node trait.
///
/// All built-in nodes and WASM plugins must implement this.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Execute the node, receive the *previous* node's JSON output as `input`,
    /// and return this node's JSON output.
    async fn execute(
        &self,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, NodeError>;
}
