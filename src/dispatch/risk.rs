//! Risk-partitioned worker resolution.
//!
//! # Responsibilities
//! - Split the worker index space at `floor(worker_count * risky_workers_percent)`
//! - Classify the first packet of a connection as risky or safe
//! - Prefer idle workers, fall back to a random worker of the right partition
//!
//! # Partition Layout
//! ```text
//! 0                 boundary                 worker_count
//! |----- safe -------|---------- risky ----------|
//! ```
//! Indices below the boundary form the safe partition and never receive a
//! risky request. `risky_workers_percent` therefore sizes the safe side; a
//! value of 0.3 with 10 workers keeps workers 0..3 free of risky traffic.
//!
//! # Design Decisions
//! - Any idle worker may take a safe request, idleness means nothing risky is running there
//! - Busy fallback for safe requests stays in the safe partition
//! - An empty fallback partition is an error, never an out-of-range index

use std::ops::Range;

use crate::classify::RiskClassifier;
use crate::dispatch::request::RequestHead;
use crate::dispatch::{
    first_idle, random_in, require_workers, DispatchError, Partition, ResolveWorker, WorkerId,
};
use crate::observability::metrics;
use crate::workers::WorkerStatusOracle;

/// Where the safe and risky partitions meet for a given pool size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionBoundary {
    worker_count: usize,
    boundary: usize,
}

impl PartitionBoundary {
    /// `risky_workers_percent` must already be validated to `[0, 1]`.
    pub fn compute(worker_count: usize, risky_workers_percent: f64) -> Self {
        let boundary = ((worker_count as f64) * risky_workers_percent).floor() as usize;
        Self {
            worker_count,
            boundary: boundary.min(worker_count),
        }
    }

    pub fn boundary(&self) -> usize {
        self.boundary
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn safe_range(&self) -> Range<usize> {
        0..self.boundary
    }

    pub fn risky_range(&self) -> Range<usize> {
        self.boundary..self.worker_count
    }

    pub fn partition_of(&self, worker: WorkerId) -> Partition {
        if worker.index() < self.boundary {
            Partition::Safe
        } else {
            Partition::Risky
        }
    }
}

/// Resolution strategy isolating risky requests on the upper worker range.
#[derive(Debug)]
pub struct RiskPartitioned<C> {
    risky_workers_percent: f64,
    classifier: C,
}

impl<C: RiskClassifier> RiskPartitioned<C> {
    /// Fails with `InvalidConfiguration` unless `risky_workers_percent` is within `[0, 1]`.
    pub fn new(risky_workers_percent: f64, classifier: C) -> Result<Self, DispatchError> {
        if !(0.0..=1.0).contains(&risky_workers_percent) {
            return Err(DispatchError::InvalidConfiguration(format!(
                "risky_workers_percent must be within [0, 1], got {risky_workers_percent}"
            )));
        }
        Ok(Self {
            risky_workers_percent,
            classifier,
        })
    }

    pub fn risky_workers_percent(&self) -> f64 {
        self.risky_workers_percent
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Partition layout for a pool of `worker_count` workers.
    pub fn boundary(&self, worker_count: usize) -> PartitionBoundary {
        PartitionBoundary::compute(worker_count, self.risky_workers_percent)
    }

    fn resolve_unclassified(
        &self,
        workers: &dyn WorkerStatusOracle,
        worker_count: usize,
    ) -> WorkerId {
        if let Some(worker) = first_idle(workers, 0..worker_count) {
            metrics::record_resolution(self.name(), "unclassified", "idle");
            return worker;
        }
        metrics::record_resolution(self.name(), "unclassified", "random");
        // worker_count > 0, so the full range is never empty.
        random_in(0..worker_count).unwrap_or(WorkerId(0))
    }

    fn resolve_risky(
        &self,
        workers: &dyn WorkerStatusOracle,
        layout: PartitionBoundary,
    ) -> Result<WorkerId, DispatchError> {
        if let Some(worker) = first_idle(workers, layout.risky_range()) {
            metrics::record_resolution(self.name(), "risky", "idle");
            return Ok(worker);
        }
        let worker = random_in(layout.risky_range()).ok_or(DispatchError::EmptyPartition {
            partition: Partition::Risky,
        })?;
        metrics::record_resolution(self.name(), "risky", "random");
        Ok(worker)
    }

    fn resolve_safe(
        &self,
        workers: &dyn WorkerStatusOracle,
        layout: PartitionBoundary,
    ) -> Result<WorkerId, DispatchError> {
        if let Some(worker) = first_idle(workers, 0..layout.worker_count()) {
            metrics::record_resolution(self.name(), "safe", "idle");
            return Ok(worker);
        }
        let worker = random_in(layout.safe_range()).ok_or(DispatchError::EmptyPartition {
            partition: Partition::Safe,
        })?;
        metrics::record_resolution(self.name(), "safe", "random");
        Ok(worker)
    }
}

impl<C: RiskClassifier> ResolveWorker for RiskPartitioned<C> {
    fn resolve(
        &self,
        workers: &dyn WorkerStatusOracle,
        payload: Option<&[u8]>,
    ) -> Result<WorkerId, DispatchError> {
        let worker_count = require_workers(workers)?;

        let payload = match payload {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => {
                let worker = self.resolve_unclassified(workers, worker_count);
                tracing::debug!(worker = %worker, "Resolved connection without data");
                return Ok(worker);
            }
        };

        let layout = self.boundary(worker_count);
        let head = RequestHead::parse(payload);
        let risky = self.classifier.is_risky(&head.request_line, &head.domain);

        let worker = if risky {
            self.resolve_risky(workers, layout)?
        } else {
            self.resolve_safe(workers, layout)?
        };

        tracing::debug!(
            worker = %worker,
            risky,
            boundary = layout.boundary(),
            request = %head.request_line,
            domain = %head.domain,
            "Resolved connection from first packet"
        );
        Ok(worker)
    }

    fn name(&self) -> &'static str {
        "risk_partitioned"
    }
}
