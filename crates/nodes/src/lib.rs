//! `nodes` crate — the `ExecutableNode` trait and built-in node implementations.
//!
//! Every node — built-in and plugin alike — must implement [`ExecutableNode`].
//! The engine crate dispatches execution through this trait object.

pub mod error;
pub mod expr;
pub mod kernels;
pub mod mock;
pub mod traits;

pub use error::NodeError;
pub use traits::{CancellationToken, ExecutableNode, ExecutionContext};
