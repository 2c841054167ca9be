//! Worker pool — bounds how many executions run concurrently (spec.md §4.3).
//!
//! A `tokio::sync::Semaphore` is the capacity primitive: acquiring a permit
//! *is* claiming a worker slot, and dropping the guard releases it, so a
//! panicking task can never leak capacity.

use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::QueueError;

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(capacity)), capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn has_available_worker(&self) -> bool {
        self.semaphore.available_permits() > 0
    }

    /// Claim a worker slot without blocking. Returns `NoCapacity` if every
    /// worker is busy — the caller (the dispatcher) should leave the item
    /// at the head of its tier and try again on the next tick.
    pub fn submit(&self) -> Result<SemaphorePermit<'_>, QueueError> {
        self.semaphore.try_acquire().map_err(|_| QueueError::NoCapacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_fails_once_capacity_is_exhausted() {
        let pool = WorkerPool::new(1);
        let _first = pool.submit().unwrap();
        assert!(!pool.has_available_worker());
        assert!(matches!(pool.submit(), Err(QueueError::NoCapacity)));
    }

    #[test]
    fn releasing_a_permit_frees_capacity() {
        let pool = WorkerPool::new(1);
        {
            let _permit = pool.submit().unwrap();
        }
        assert!(pool.has_available_worker());
    }
}
