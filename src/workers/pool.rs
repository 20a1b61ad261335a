//! In-process worker pool used by the simulator.
//!
//! # Responsibilities
//! - Represent a fixed set of workers
//! - Track in-flight requests per worker (busy while non-zero)
//! - Count handled requests for reporting

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::dispatch::WorkerId;
use crate::workers::{WorkerStatus, WorkerStatusOracle};

#[derive(Debug, Default)]
struct WorkerSlot {
    in_flight: AtomicUsize,
    handled: AtomicU64,
}

/// A fixed-size pool of simulated workers.
#[derive(Debug)]
pub struct SimulatedPool {
    slots: Vec<WorkerSlot>,
}

impl SimulatedPool {
    pub fn new(worker_count: usize) -> Self {
        Self {
            slots: (0..worker_count).map(|_| WorkerSlot::default()).collect(),
        }
    }

    /// Mark `worker` busy until the returned guard is dropped.
    ///
    /// Returns `None` for an index outside the pool.
    pub fn begin(self: &Arc<Self>, worker: WorkerId) -> Option<WorkerGuard> {
        let slot = self.slots.get(worker.index())?;
        slot.in_flight.fetch_add(1, Ordering::AcqRel);
        slot.handled.fetch_add(1, Ordering::Relaxed);
        Some(WorkerGuard {
            pool: self.clone(),
            worker,
        })
    }

    /// Requests currently being processed by `worker`.
    pub fn in_flight(&self, worker: WorkerId) -> usize {
        self.slots
            .get(worker.index())
            .map(|s| s.in_flight.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Requests handled by each worker so far, by index.
    pub fn handled_counts(&self) -> Vec<u64> {
        self.slots
            .iter()
            .map(|s| s.handled.load(Ordering::Relaxed))
            .collect()
    }

    fn finish(&self, worker: WorkerId) {
        if let Some(slot) = self.slots.get(worker.index()) {
            slot.in_flight.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl WorkerStatusOracle for SimulatedPool {
    fn worker_count(&self) -> usize {
        self.slots.len()
    }

    fn worker_status(&self, worker: WorkerId) -> WorkerStatus {
        match self.slots.get(worker.index()) {
            Some(slot) if slot.in_flight.load(Ordering::Acquire) == 0 => WorkerStatus::Idle,
            Some(_) => WorkerStatus::Busy,
            None => WorkerStatus::Unknown,
        }
    }
}

/// RAII guard for one in-flight request on a worker.
#[derive(Debug)]
pub struct WorkerGuard {
    pool: Arc<SimulatedPool>,
    worker: WorkerId,
}

impl WorkerGuard {
    pub fn worker(&self) -> WorkerId {
        self.worker
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.pool.finish(self.worker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_marks_busy() {
        let pool = Arc::new(SimulatedPool::new(2));
        assert_eq!(pool.worker_status(WorkerId(1)), WorkerStatus::Idle);

        let guard = pool.begin(WorkerId(1)).unwrap();
        assert_eq!(pool.worker_status(WorkerId(1)), WorkerStatus::Busy);
        assert_eq!(pool.worker_status(WorkerId(0)), WorkerStatus::Idle);

        let second = pool.begin(WorkerId(1)).unwrap();
        drop(guard);
        assert_eq!(pool.worker_status(WorkerId(1)), WorkerStatus::Busy);
        drop(second);
        assert_eq!(pool.worker_status(WorkerId(1)), WorkerStatus::Idle);

        assert_eq!(pool.handled_counts(), vec![0, 2]);
    }

    #[test]
    fn test_out_of_range() {
        let pool = Arc::new(SimulatedPool::new(1));
        assert_eq!(pool.worker_status(WorkerId(5)), WorkerStatus::Unknown);
        assert!(pool.begin(WorkerId(5)).is_none());
        assert_eq!(pool.in_flight(WorkerId(5)), 0);
    }

    #[test]
    fn test_status_from_u8() {
        assert_eq!(WorkerStatus::from(1), WorkerStatus::Idle);
        assert_eq!(WorkerStatus::from(2), WorkerStatus::Busy);
        assert_eq!(WorkerStatus::from(9), WorkerStatus::Unknown);
    }
}
