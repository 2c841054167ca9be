//! Dead-letter queue. Guarded by a single mutex (spec.md §5 shared-resource
//! policy: "single-mutex DLQ") — contention here is rare enough that a
//! finer-grained lock would only add complexity.

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::QueueError;
use crate::models::DeadLetter;

const RETENTION_DAYS: i64 = 7;

pub struct DeadLetterQueue {
    items: Mutex<Vec<DeadLetter>>,
    pool: Option<db::DbPool>,
}

impl DeadLetterQueue {
    pub fn new(pool: Option<db::DbPool>) -> Self {
        Self { items: Mutex::new(Vec::new()), pool }
    }

    pub async fn push(&self, letter: DeadLetter) -> Result<(), QueueError> {
        if let Some(pool) = &self.pool {
            let row = db::models::DeadLetterRow {
                id: letter.id,
                request: serde_json::to_value(&letter.request).unwrap_or(serde_json::Value::Null),
                error: letter.error.clone(),
                retry_count: letter.retry_count as i32,
                max_retries: letter.max_retries as i32,
                created_at: letter.created_at,
            };
            db::repository::queue::dead_letter(pool, &row).await?;
        }
        self.items.lock().await.push(letter);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn retryable(&self) -> Vec<DeadLetter> {
        self.items.lock().await.iter().filter(|l| l.can_retry()).cloned().collect()
    }

    pub async fn remove(&self, id: Uuid) {
        self.items.lock().await.retain(|l| l.id != id);
    }

    /// Purge entries older than the 7-day retention window.
    pub async fn purge_expired(&self) -> Result<u64, QueueError> {
        let cutoff = Utc::now() - ChronoDuration::days(RETENTION_DAYS);
        self.items.lock().await.retain(|l| l.created_at >= cutoff);

        if let Some(pool) = &self.pool {
            return Ok(db::repository::queue::purge_dead_letters_before(pool, cutoff).await?);
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::models::{ExecutionRequest, Priority};

    fn request() -> ExecutionRequest {
        ExecutionRequest::new(Uuid::new_v4(), Priority::Normal, serde_json::Value::Null)
    }

    #[tokio::test]
    async fn can_retry_respects_default_max_of_three() {
        let mut letter = DeadLetter::new(request(), "boom", 3);
        assert!(letter.can_retry());
        letter.retry_count = 3;
        assert!(!letter.can_retry());
    }

    #[tokio::test]
    async fn retryable_filters_out_exhausted_entries() {
        let dlq = DeadLetterQueue::new(None);
        let mut exhausted = DeadLetter::new(request(), "boom", 3);
        exhausted.retry_count = 3;
        dlq.push(exhausted).await.unwrap();
        dlq.push(DeadLetter::new(request(), "boom", 3)).await.unwrap();

        assert_eq!(dlq.retryable().await.len(), 1);
    }
}
