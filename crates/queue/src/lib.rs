//! `queue` crate — the three-tier priority admission queue, worker pool,
//! dead-letter store, and dispatcher that together implement spec.md §4.2
//! and §4.3.

pub mod dead_letter;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod priority_queue;
pub mod worker_pool;

pub use dead_letter::DeadLetterQueue;
pub use dispatcher::Dispatcher;
pub use error::QueueError;
pub use models::{DeadLetter, QueuedItem};
pub use priority_queue::{PriorityQueue, PriorityQueueConfig};
pub use worker_pool::WorkerPool;
