//! Typed error type for the archive crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("execution {0} not found in hot or cold storage")]
    NotFound(uuid::Uuid),

    #[error("object store error: {0}")]
    Storage(String),

    #[error("failed to (de)serialize archive blob: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}
