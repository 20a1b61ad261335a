//! Worker status subsystem.
//!
//! # Data Flow
//! ```text
//! Resolution strategy
//!     → WorkerStatusOracle::worker_count()
//!     → WorkerStatusOracle::worker_status(index)  (idle / busy / unknown)
//!
//! Host runtime (or pool.rs in simulation) owns the workers and
//! answers status queries; the dispatcher only reads.
//! ```
//!
//! # Design Decisions
//! - The oracle is an injected trait so strategies can be tested against fakes
//! - Status queries must be cheap and non-blocking (atomic loads)
//! - Out-of-range indices report `Unknown`, never panic

pub mod pool;

pub use pool::{SimulatedPool, WorkerGuard};

use crate::dispatch::WorkerId;

/// Current state of a worker as reported by the host.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Unknown = 0,
    Idle = 1,
    Busy = 2,
}

impl From<u8> for WorkerStatus {
    fn from(val: u8) -> Self {
        match val {
            1 => WorkerStatus::Idle,
            2 => WorkerStatus::Busy,
            _ => WorkerStatus::Unknown,
        }
    }
}

/// Read-only view of the host's worker pool.
pub trait WorkerStatusOracle: Send + Sync {
    /// Total number of worker processes.
    fn worker_count(&self) -> usize;

    /// Status of the worker at `worker`.
    fn worker_status(&self, worker: WorkerId) -> WorkerStatus;

    fn is_idle(&self, worker: WorkerId) -> bool {
        self.worker_status(worker) == WorkerStatus::Idle
    }
}

/// Fixed-status oracle for unit tests.
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct StaticWorkers(pub Vec<WorkerStatus>);

#[cfg(test)]
impl StaticWorkers {
    pub fn all(count: usize, status: WorkerStatus) -> Self {
        Self(vec![status; count])
    }

    pub fn with_idle(count: usize, idle: &[usize]) -> Self {
        let mut statuses = vec![WorkerStatus::Busy; count];
        for &i in idle {
            statuses[i] = WorkerStatus::Idle;
        }
        Self(statuses)
    }
}

#[cfg(test)]
impl WorkerStatusOracle for StaticWorkers {
    fn worker_count(&self) -> usize {
        self.0.len()
    }

    fn worker_status(&self, worker: WorkerId) -> WorkerStatus {
        self.0.get(worker.index()).copied().unwrap_or(WorkerStatus::Unknown)
    }
}

impl<T: WorkerStatusOracle + ?Sized> WorkerStatusOracle for std::sync::Arc<T> {
    fn worker_count(&self) -> usize {
        (**self).worker_count()
    }

    fn worker_status(&self, worker: WorkerId) -> WorkerStatus {
        (**self).worker_status(worker)
    }
}
