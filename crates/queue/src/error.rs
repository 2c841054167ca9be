//! Typed error type for the queue crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is at capacity")]
    QueueFull,

    #[error("no worker slot is currently available")]
    NoCapacity,

    #[error("item not found in queue")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}
