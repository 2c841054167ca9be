//! `archive` crate — moves terminal executions out of the hot table into
//! gzip-compressed cold storage and lets callers read through both tiers
//! transparently (spec.md §4.6).

pub mod engine;
pub mod error;
pub mod models;
pub mod object_store;

pub use engine::ArchiveEngine;
pub use error::ArchiveError;
pub use models::{ArchiveBlob, ArchiveFilter};
pub use object_store::{FilesystemObjectStore, ObjectStore};
