//! `engine` crate — core domain models, DAG validation, and the orchestrator
//! that drives a workflow from admission through its terminal state.

pub mod models;
pub mod error;
pub mod dag;
pub mod orchestrator;
pub mod registry;

pub use dag::{topological_order, validate};
pub use error::{EngineError, ErrorCode, ValidationError, ValidationWarning};
pub use models::{Execution, ExecutionGraph, ExecutionStatus, Node, NodeType, Trigger, Workflow};
pub use orchestrator::{EventPublisher, NoopPublisher, Orchestrator, OrchestratorConfig};
pub use registry::NodeRegistry;

// The `{{name}}` / `{{nodeId.field}}` template parser lives in `nodes::expr`
// (not here) because node kernels — `condition`, `switch`, `function`,
// `json` — need it and this crate already depends on `nodes`, not the
// reverse.
pub use nodes::expr;
