//! Maps a node's `type` string to the [`ExecutableNode`] that runs it.
//!
//! Keyed by `&str` rather than `nodes::NodeType` because `nodes` cannot
//! depend on `engine` (the dependency runs the other way); the orchestrator
//! bridges the two at `NodeType::as_str()`.

use std::collections::HashMap;
use std::sync::Arc;

use nodes::kernels::*;
use nodes::ExecutableNode;

pub struct NodeRegistry {
    kernels: HashMap<&'static str, Arc<dyn ExecutableNode>>,
}

impl NodeRegistry {
    pub fn get(&self, node_type: &str) -> Option<Arc<dyn ExecutableNode>> {
        self.kernels.get(node_type).cloned()
    }

    pub fn register(&mut self, node_type: &'static str, kernel: Arc<dyn ExecutableNode>) {
        self.kernels.insert(node_type, kernel);
    }
}

/// The registry wired with every built-in kernel that needs no external
/// resources. `http_request`, `database`, `email`, and `slack` carry shared
/// resources (an HTTP client, a connection pool, a transport) and are
/// registered separately by the binary that owns those resources.
impl Default for NodeRegistry {
    fn default() -> Self {
        let mut kernels: HashMap<&'static str, Arc<dyn ExecutableNode>> = HashMap::new();
        kernels.insert("condition", Arc::new(ConditionNode));
        kernels.insert("switch", Arc::new(SwitchNode));
        kernels.insert("loop", Arc::new(LoopNode));
        kernels.insert("foreach", Arc::new(ForeachNode));
        kernels.insert("while", Arc::new(WhileNode));
        kernels.insert("split", Arc::new(SplitNode));
        kernels.insert("merge", Arc::new(MergeNode));
        kernels.insert("aggregate", Arc::new(AggregateNode));
        kernels.insert("code", Arc::new(CodeNode));
        kernels.insert("set", Arc::new(SetNode));
        kernels.insert("function", Arc::new(FunctionNode));
        kernels.insert("wait", Arc::new(WaitNode));
        kernels.insert("datetime", Arc::new(DatetimeNode));
        kernels.insert("crypto", Arc::new(CryptoNode));
        kernels.insert("json", Arc::new(JsonNode));
        kernels.insert("math", Arc::new(MathNode));
        kernels.insert("text", Arc::new(TextNode));
        kernels.insert("http_request", Arc::new(HttpRequestNode::default()));
        Self { kernels }
    }
}
