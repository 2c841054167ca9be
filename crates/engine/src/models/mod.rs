//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow and its
//! executions look like in memory. They serialise to/from the JSONB
//! columns the `db` crate persists.

pub mod execution;
pub mod graph;
pub mod trigger;
pub mod variable;
pub mod workflow;

pub use execution::{
    Execution, ExecutionMetric, ExecutionMode, ExecutionRequest, ExecutionStatus, NodeExecution,
    NodeExecutionStatus, Priority, StateTransition,
};
pub use graph::{ExecutionGraph, ParallelGroup};
pub use trigger::{IncomingEvent, MisfirePolicy, Trigger, TriggerKind, TriggerStatus};
pub use variable::{EnvironmentKind, Variable, VariableContext};
pub use workflow::{Connection, Node, NodeType, Position, Workflow, WorkflowVersion};
