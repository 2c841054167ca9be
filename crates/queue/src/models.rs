//! In-memory queue item shapes. The durable mirror lives in `db::models`;
//! these types convert to/from that representation at the persistence
//! boundary.

use chrono::{DateTime, Utc};
use engine::models::{ExecutionRequest, Priority};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedItem {
    pub request: ExecutionRequest,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedItem {
    pub fn new(request: ExecutionRequest) -> Self {
        Self { enqueued_at: request.requested_at, request }
    }

    pub fn id(&self) -> Uuid {
        self.request.id
    }

    pub fn priority(&self) -> Priority {
        self.request.priority
    }
}

/// Ordered oldest-first within a tier — the `BinaryHeap<Reverse<_>>` in
/// [`crate::priority_queue::PriorityQueue`] pops the smallest `enqueued_at`.
impl PartialEq for QueuedItem {
    fn eq(&self, other: &Self) -> bool {
        self.enqueued_at == other.enqueued_at
    }
}
impl Eq for QueuedItem {}
impl PartialOrd for QueuedItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.enqueued_at.cmp(&other.enqueued_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub request: ExecutionRequest,
    pub error: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(request: ExecutionRequest, error: impl Into<String>, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            retry_count: 0,
            request,
            error: error.into(),
            max_retries,
            created_at: Utc::now(),
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}
