//! Round-robin worker resolution.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::dispatch::{require_workers, DispatchError, ResolveWorker, WorkerId};
use crate::observability::metrics;
use crate::workers::WorkerStatusOracle;

/// Round-robin selector.
/// Rotates a start index and takes the first idle worker from there,
/// or the start index itself when every worker is busy.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResolveWorker for RoundRobin {
    fn resolve(
        &self,
        workers: &dyn WorkerStatusOracle,
        _payload: Option<&[u8]>,
    ) -> Result<WorkerId, DispatchError> {
        let len = require_workers(workers)?;
        let start = self.counter.fetch_add(1, Ordering::Relaxed);

        for i in 0..len {
            let worker = WorkerId((start + i) % len);
            if workers.is_idle(worker) {
                metrics::record_resolution(self.name(), "unclassified", "idle");
                return Ok(worker);
            }
        }

        metrics::record_resolution(self.name(), "unclassified", "rotation");
        Ok(WorkerId(start % len))
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
