//! Typed error type for the triggers crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("trigger not found")]
    NotFound,

    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    #[error("invalid or missing webhook signature")]
    InvalidSignature,

    #[error("failed to (de)serialize trigger payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),
}
