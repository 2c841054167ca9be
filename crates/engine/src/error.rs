//! Engine-level error types.

use thiserror::Error;

/// A structural or semantic problem found while validating a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    #[error("workflow has no trigger or webhook node")]
    NoTrigger,

    #[error("connection references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference { node_id: String, side: &'static str },

    #[error("workflow graph contains a cycle")]
    CycleDetected,

    #[error("node '{node_id}' ({node_type}) is missing required parameter '{field}'")]
    MissingParameter {
        node_id: String,
        node_type: String,
        field: String,
    },

    #[error("node '{node_id}' has invalid parameter '{field}': {reason}")]
    InvalidParameter {
        node_id: String,
        field: String,
        reason: String,
    },

    #[error("node '{node_id}' timeout must be in [1, 300] seconds, got {value}")]
    TimeoutOutOfRange { node_id: String, value: i64 },

    #[error("node '{node_id}' ({node_type}) emits on unsupported port '{port}'")]
    IncompatiblePort {
        node_id: String,
        node_type: String,
        port: String,
    },
}

/// A non-fatal observation surfaced alongside a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// A non-trigger node has no incoming edges and will never run.
    UnreachableNode { node_id: String },
    /// A `merge` node has fewer than two incoming edges.
    MergeMissingInputs { node_id: String, incoming: usize },
}

/// The stable error codes from spec.md §7, surfaced on `Execution.error_code`
/// and the `execution.failed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ValidationFailed,
    QueueFull,
    NotFound,
    VersionMismatch,
    Timeout,
    Cancelled,
    NodeFailed,
    CycleDetected,
    RetryableIo,
    FatalInternal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::QueueFull => "QUEUE_FULL",
            Self::NotFound => "NOT_FOUND",
            Self::VersionMismatch => "VERSION_MISMATCH",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::NodeFailed => "NODE_FAILED",
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::RetryableIo => "RETRYABLE_IO",
            Self::FatalInternal => "FATAL_INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors produced by the workflow engine (validation + orchestration).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow failed validation: {0:?}")]
    Validation(Vec<ValidationError>),

    #[error("workflow graph contains a cycle")]
    CycleDetected,

    #[error("node '{node_id}' failed fatally: {message}")]
    NodeFatal { node_id: String, message: String },

    #[error("node '{node_id}' exceeded retry limit: {message}")]
    NodeRetryExhausted { node_id: String, message: String },

    #[error("node '{node_id}' exceeded its deadline")]
    NodeTimeout { node_id: String },

    #[error("execution was cancelled")]
    Cancelled,

    #[error("no implementation registered for node_type '{0}'")]
    UnknownNodeType(String),

    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl EngineError {
    /// The stable error code surfaced on the `Execution` row.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::CycleDetected => ErrorCode::CycleDetected,
            Self::NodeFatal { .. } | Self::NodeRetryExhausted { .. } => ErrorCode::NodeFailed,
            Self::NodeTimeout { .. } => ErrorCode::Timeout,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::UnknownNodeType(_) => ErrorCode::NodeFailed,
            Self::Database(_) => ErrorCode::FatalInternal,
            Self::Internal(_) => ErrorCode::FatalInternal,
        }
    }
}
