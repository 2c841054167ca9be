//! The 10-second scheduler tick (spec.md §4.7): evaluates every active
//! `schedule` trigger and submits `ExecutionRequest`s at `normal` priority.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use db::repository::executions::ExecutionFilter;
use engine::models::{ExecutionRequest, Priority, TriggerKind};
use nodes::CancellationToken;
use queue::{PriorityQueue, QueuedItem};
use tracing::{error, info, warn};

use crate::convert::row_to_trigger;
use crate::error::TriggerError;
use crate::misfire;

const TICK_INTERVAL: Duration = Duration::from_secs(10);

pub struct Scheduler {
    pool: db::DbPool,
    queue: Arc<PriorityQueue>,
}

impl Scheduler {
    pub fn new(pool: db::DbPool, queue: Arc<PriorityQueue>) -> Self {
        Self { pool, queue }
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            ticker.tick().await;
            if shutdown.is_cancelled() {
                info!("scheduler shutting down");
                return;
            }
            if let Err(err) = self.tick().await {
                error!(%err, "scheduler tick failed");
            }
        }
    }

    /// Evaluate every active schedule trigger once. Public so tests and the
    /// CLI's `scheduler` subcommand can drive a single pass deterministically.
    pub async fn tick(&self) -> Result<(), TriggerError> {
        let now = Utc::now();
        let rows = db::repository::triggers::list_active(&self.pool).await?;

        for row in rows {
            let trigger = match row_to_trigger(&row) {
                Ok(trigger) => trigger,
                Err(err) => {
                    warn!(trigger_id = %row.id, %err, "failed to decode trigger, skipping");
                    continue;
                }
            };

            let TriggerKind::Schedule { cron_expression, timezone, start_date, end_date, misfire_policy } = &trigger.kind else {
                continue;
            };

            let since = trigger.last_fired_at.or(*start_date).unwrap_or(trigger.created_at);
            let occurrences = misfire::missed_occurrences(cron_expression, timezone, since, now)?;
            if occurrences.is_empty() {
                continue;
            }
            if let Some(end) = end_date {
                if since >= *end {
                    continue;
                }
            }

            let workflow_busy = self.workflow_has_running_execution(trigger.workflow_id).await?;

            // A single occurrence on a free workflow is the ordinary case:
            // fire it as-is. Anything else (multiple missed ticks, or the
            // workflow still busy) goes through the misfire policy.
            let to_fire = if occurrences.len() == 1 && !workflow_busy {
                occurrences.clone()
            } else {
                misfire::resolve(*misfire_policy, &occurrences, now)
            };

            if to_fire.is_empty() {
                continue;
            }

            for scheduled_at in &to_fire {
                let mut request = ExecutionRequest::new(trigger.workflow_id, Priority::Normal, serde_json::json!({}));
                request.scheduled_at = Some(*scheduled_at);
                self.queue.enqueue(QueuedItem::new(request)).await?;
            }

            db::repository::triggers::record_fire(&self.pool, trigger.id, now).await?;
            info!(trigger_id = %trigger.id, workflow_id = %trigger.workflow_id, fired = to_fire.len(), "schedule trigger fired");
        }

        Ok(())
    }

    async fn workflow_has_running_execution(&self, workflow_id: uuid::Uuid) -> Result<bool, TriggerError> {
        let filter = ExecutionFilter {
            workflow_id: Some(workflow_id),
            status: Some("running".to_string()),
            creator_id: None,
            since: None,
            until: None,
            limit: 1,
            offset: 0,
        };
        let rows = db::repository::executions::list_executions(&self.pool, &filter).await?;
        Ok(!rows.is_empty())
    }
}
