//! Three-tier admission queue (spec.md §4.2). `high` is always drained
//! before `normal`, `normal` before `low`; within a tier, items come out in
//! `enqueued_at` order. A Postgres-backed mirror is maintained so a process
//! restart can rebuild the in-memory heaps without losing admitted work.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use engine::models::Priority;
use engine::orchestrator::{EventPublisher, NoopPublisher};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::error::QueueError;
use crate::models::QueuedItem;

const MIRROR_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone)]
pub struct PriorityQueueConfig {
    /// The admitted total across all three tiers combined (spec.md §4.2:
    /// "fails with QueueFull when the sum of tier sizes reaches the
    /// configured maximum"; §5 names one `max_queue_size`). Zero means
    /// unbounded.
    pub max_queue_size: usize,
    pub snapshot_interval: std::time::Duration,
}

impl Default for PriorityQueueConfig {
    fn default() -> Self {
        Self { max_queue_size: 30_000, snapshot_interval: std::time::Duration::from_secs(5) }
    }
}

struct Tiers {
    high: BinaryHeap<Reverse<QueuedItem>>,
    normal: BinaryHeap<Reverse<QueuedItem>>,
    low: BinaryHeap<Reverse<QueuedItem>>,
}

impl Tiers {
    fn new() -> Self {
        Self { high: BinaryHeap::new(), normal: BinaryHeap::new(), low: BinaryHeap::new() }
    }

    fn tier_mut(&mut self, priority: Priority) -> &mut BinaryHeap<Reverse<QueuedItem>> {
        match priority {
            Priority::High => &mut self.high,
            Priority::Normal => &mut self.normal,
            Priority::Low => &mut self.low,
        }
    }

    fn pop_highest(&mut self) -> Option<QueuedItem> {
        self.high
            .pop()
            .or_else(|| self.normal.pop())
            .or_else(|| self.low.pop())
            .map(|Reverse(item)| item)
    }

    fn total_len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }
}

/// Durable-mirrored, priority-ordered admission queue.
pub struct PriorityQueue {
    tiers: Mutex<Tiers>,
    config: PriorityQueueConfig,
    pool: Option<db::DbPool>,
    events: Arc<dyn EventPublisher>,
}

impl PriorityQueue {
    pub fn new(config: PriorityQueueConfig, pool: Option<db::DbPool>) -> Self {
        Self { tiers: Mutex::new(Tiers::new()), config, pool, events: Arc::new(NoopPublisher) }
    }

    /// Wire a real event bus so every admission path (API, webhook,
    /// scheduler) gets `execution.queued` for free from `enqueue` itself,
    /// instead of each caller having to remember to publish it.
    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    /// Admit `item`, failing with `QueueFull` once the combined size of all
    /// three tiers reaches `max_queue_size` (spec.md §4.2), then publish
    /// `execution.queued` (spec.md §4.2/§6).
    pub async fn enqueue(&self, item: QueuedItem) -> Result<(), QueueError> {
        {
            let mut tiers = self.tiers.lock().await;
            if self.config.max_queue_size != 0 && tiers.total_len() >= self.config.max_queue_size {
                return Err(QueueError::QueueFull);
            }
            let tier = tiers.tier_mut(item.priority());
            tier.push(Reverse(item.clone()));
        }

        if let Some(pool) = &self.pool {
            let row = db::models::QueueItemRow {
                item_key: db::repository::queue::item_key(item.id()),
                priority: item.priority().as_str().to_string(),
                payload: serde_json::to_value(&item.request)
                    .map_err(|e| QueueError::Database(db::DbError::Sqlx(sqlx::Error::Protocol(e.to_string()))))?,
                enqueued_at: item.enqueued_at,
                expires_at: item.enqueued_at + ChronoDuration::hours(MIRROR_TTL_HOURS),
            };
            db::repository::queue::upsert_item(pool, &row).await?;
        }

        self.events.publish("execution.queued", serde_json::json!({
            "execution_id": item.id(),
            "workflow_id": item.request.workflow_id,
            "priority": item.priority().as_str(),
        })).await;

        Ok(())
    }

    /// Highest-priority, oldest-first pop. Removes the item from the
    /// durable mirror too.
    pub async fn dequeue(&self) -> Option<QueuedItem> {
        let item = {
            let mut tiers = self.tiers.lock().await;
            tiers.pop_highest()
        }?;

        if let Some(pool) = &self.pool {
            if let Err(err) = db::repository::queue::remove_item(pool, item.id()).await {
                warn!(%err, "failed to remove dequeued item from durable mirror");
            }
        }

        Some(item)
    }

    pub async fn len(&self) -> usize {
        let tiers = self.tiers.lock().await;
        tiers.high.len() + tiers.normal.len() + tiers.low.len()
    }

    /// Snapshot all three tiers to `queue:high|normal|low` and evict
    /// expired mirror rows. Called on `snapshot_interval` (default 5s).
    pub async fn snapshot(&self) -> Result<(), QueueError> {
        let Some(pool) = &self.pool else { return Ok(()) };

        let tiers = self.tiers.lock().await;
        for (priority, heap) in [
            (Priority::High, &tiers.high),
            (Priority::Normal, &tiers.normal),
            (Priority::Low, &tiers.low),
        ] {
            let items: Vec<&QueuedItem> = heap.iter().map(|Reverse(item)| item).collect();
            let payload = serde_json::to_value(&items).unwrap_or(serde_json::Value::Null);
            db::repository::queue::write_snapshot(pool, priority.as_str(), payload).await?;
        }
        drop(tiers);

        db::repository::queue::evict_expired_items(pool, Utc::now()).await?;
        Ok(())
    }

    /// Rebuild the in-memory heaps from the most recent durable snapshot,
    /// in high -> normal -> low restore order (spec.md §4.2).
    pub async fn restore(&self) -> Result<usize, QueueError> {
        let Some(pool) = &self.pool else { return Ok(0) };

        let mut restored = 0usize;
        let mut tiers = self.tiers.lock().await;
        for snapshot in db::repository::queue::read_snapshots(pool).await? {
            let items: Vec<QueuedItem> = serde_json::from_value(snapshot.items).unwrap_or_default();
            let priority = snapshot
                .tier_key
                .strip_prefix("queue:")
                .and_then(|p| p.parse::<Priority>().ok());
            let Some(priority) = priority else { continue };
            let tier = tiers.tier_mut(priority);
            for item in items {
                tier.push(Reverse(item));
                restored += 1;
            }
        }
        info!(restored, "restored queue from durable snapshot");
        Ok(restored)
    }

    /// Spawn the periodic snapshot task. Returns a sender that, when
    /// dropped, stops the loop.
    pub fn spawn_snapshot_loop(self: &Arc<Self>) -> mpsc::Sender<()> {
        let (tx, mut rx) = mpsc::channel::<()>(1);
        let queue = Arc::clone(self);
        let interval = queue.config.snapshot_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = queue.snapshot().await {
                            warn!(%err, "queue snapshot failed");
                        }
                    }
                    _ = rx.recv() => break,
                }
            }
        });
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn item(priority: Priority, offset_secs: i64) -> QueuedItem {
        let mut request = engine::models::ExecutionRequest::new(Uuid::new_v4(), priority, serde_json::Value::Null);
        request.requested_at = Utc::now() + ChronoDuration::seconds(offset_secs);
        QueuedItem::new(request)
    }

    #[tokio::test]
    async fn high_priority_drains_before_normal_and_low() {
        let queue = PriorityQueue::new(PriorityQueueConfig::default(), None);
        queue.enqueue(item(Priority::Low, 0)).await.unwrap();
        queue.enqueue(item(Priority::Normal, 0)).await.unwrap();
        queue.enqueue(item(Priority::High, 0)).await.unwrap();

        assert_eq!(queue.dequeue().await.unwrap().priority(), Priority::High);
        assert_eq!(queue.dequeue().await.unwrap().priority(), Priority::Normal);
        assert_eq!(queue.dequeue().await.unwrap().priority(), Priority::Low);
        assert!(queue.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn same_tier_is_oldest_first() {
        let queue = PriorityQueue::new(PriorityQueueConfig::default(), None);
        let older = item(Priority::Normal, -10);
        let newer = item(Priority::Normal, 0);
        queue.enqueue(newer.clone()).await.unwrap();
        queue.enqueue(older.clone()).await.unwrap();

        assert_eq!(queue.dequeue().await.unwrap().id(), older.id());
        assert_eq!(queue.dequeue().await.unwrap().id(), newer.id());
    }

    #[tokio::test]
    async fn capacity_limit_rejects_further_enqueues() {
        let config = PriorityQueueConfig { max_queue_size: 1, ..Default::default() };
        let queue = PriorityQueue::new(config, None);
        queue.enqueue(item(Priority::Low, 0)).await.unwrap();
        let err = queue.enqueue(item(Priority::Low, 1)).await.unwrap_err();
        assert!(matches!(err, QueueError::QueueFull));
    }

    #[tokio::test]
    async fn capacity_limit_is_shared_across_tiers() {
        let config = PriorityQueueConfig { max_queue_size: 2, ..Default::default() };
        let queue = PriorityQueue::new(config, None);
        queue.enqueue(item(Priority::High, 0)).await.unwrap();
        queue.enqueue(item(Priority::Normal, 0)).await.unwrap();
        let err = queue.enqueue(item(Priority::Low, 0)).await.unwrap_err();
        assert!(matches!(err, QueueError::QueueFull));
    }
}
