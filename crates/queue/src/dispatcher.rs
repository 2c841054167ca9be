//! The dispatcher tick (spec.md §4.3: "a 100ms tick pops ready items and
//! hands them to an available worker"). Owns no business logic itself — it
//! only bridges the priority queue, the worker pool, and the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use engine::{ExecutionStatus, Orchestrator};
use nodes::CancellationToken;
use tracing::{error, info, warn};

use crate::dead_letter::DeadLetterQueue;
use crate::models::DeadLetter;
use crate::priority_queue::PriorityQueue;
use crate::worker_pool::WorkerPool;

const DISPATCH_TICK: Duration = Duration::from_millis(100);
const DEFAULT_MAX_RETRIES: u32 = 3;

pub struct Dispatcher {
    queue: Arc<PriorityQueue>,
    workers: Arc<WorkerPool>,
    orchestrator: Arc<Orchestrator>,
    dead_letters: Arc<DeadLetterQueue>,
    pool: db::DbPool,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<PriorityQueue>,
        workers: Arc<WorkerPool>,
        orchestrator: Arc<Orchestrator>,
        dead_letters: Arc<DeadLetterQueue>,
        pool: db::DbPool,
    ) -> Self {
        Self { queue, workers, orchestrator, dead_letters, pool }
    }

    /// Run the tick loop until cancelled. Intended to be spawned as its own
    /// task for the lifetime of the worker process.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(DISPATCH_TICK);
        loop {
            ticker.tick().await;
            if shutdown.is_cancelled() {
                info!("dispatcher shutting down");
                return;
            }
            self.dispatch_ready().await;
        }
    }

    /// Drain as many ready items as the worker pool has capacity for. Left
    /// public so tests and the CLI's `worker` subcommand can drive a single
    /// tick without waiting on the interval.
    pub async fn dispatch_ready(&self) {
        while self.workers.has_available_worker() {
            let Some(item) = self.queue.dequeue().await else { break };

            let permit = match self.workers.submit() {
                Ok(permit) => permit,
                Err(_) => {
                    // Lost the race against another dispatcher tick; put the
                    // item back at the front of its tier rather than drop it.
                    let _ = self.queue.enqueue(item).await;
                    break;
                }
            };

            let orchestrator = Arc::clone(&self.orchestrator);
            let dead_letters = Arc::clone(&self.dead_letters);
            let pool = self.pool.clone();

            tokio::spawn(async move {
                let _permit = permit;
                run_one(orchestrator, dead_letters, pool, item).await;
            });
        }
    }
}

async fn run_one(
    orchestrator: Arc<Orchestrator>,
    dead_letters: Arc<DeadLetterQueue>,
    pool: db::DbPool,
    item: crate::models::QueuedItem,
) {
    let workflow_row = match db::repository::workflows::get_workflow(&pool, item.request.workflow_id).await {
        Ok(row) => row,
        Err(err) => {
            error!(%err, execution_request = %item.id(), "failed to load workflow for dispatch");
            dead_letter(&dead_letters, item, err.to_string()).await;
            return;
        }
    };

    let workflow: engine::Workflow = match serde_json::from_value(workflow_row.definition) {
        Ok(workflow) => workflow,
        Err(err) => {
            error!(%err, "workflow definition failed to deserialize");
            dead_letter(&dead_letters, item, err.to_string()).await;
            return;
        }
    };

    let cancellation = CancellationToken::new();
    match orchestrator.execute(&workflow, item.request.clone(), cancellation).await {
        Ok(execution) if execution.status == ExecutionStatus::Completed => {
            info!(execution_id = %execution.id, "execution completed");
        }
        Ok(execution) => {
            warn!(execution_id = %execution.id, status = %execution.status, "execution ended in a non-success terminal state");
            if execution.status == ExecutionStatus::Failed {
                let message = execution.error.clone().unwrap_or_else(|| "node failed".to_string());
                dead_letter(&dead_letters, item, message).await;
            }
        }
        Err(err) => {
            error!(%err, "orchestrator returned an error before an execution record existed");
            dead_letter(&dead_letters, item, err.to_string()).await;
        }
    }
}

async fn dead_letter(dead_letters: &DeadLetterQueue, item: crate::models::QueuedItem, error: String) {
    let letter = DeadLetter::new(item.request, error, DEFAULT_MAX_RETRIES);
    if let Err(err) = dead_letters.push(letter).await {
        error!(%err, "failed to persist dead-lettered execution");
    }
}
