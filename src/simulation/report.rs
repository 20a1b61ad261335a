//! Simulation results.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::StrategyKind;
use crate::dispatch::{Partition, PartitionBoundary, WorkerId};

/// What happened on one simulated connection.
#[derive(Debug, Default)]
pub(crate) struct ConnectionOutcome {
    /// Whether the connection carried risky traffic.
    pub risky: bool,
    /// Worker of every request that was dispatched successfully.
    pub placements: Vec<WorkerId>,
    /// Events routed to a worker other than the connection's first.
    pub affinity_violations: u64,
    /// Error kinds of failed dispatch calls.
    pub errors: Vec<&'static str>,
}

/// Aggregate result of a simulation run, printed as JSON by the binary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub strategy: StrategyKind,
    pub workers: usize,
    /// First index of the risky partition.
    pub boundary: usize,
    pub connections: usize,
    pub requests: u64,
    pub risky_requests: u64,
    pub risky_in_risky_partition: u64,
    pub risky_in_safe_partition: u64,
    pub safe_in_risky_partition: u64,
    pub affinity_violations: u64,
    pub errors: BTreeMap<String, u64>,
    pub requests_per_worker: Vec<u64>,
    pub elapsed_ms: u64,
    /// Set when a shutdown signal stopped the run early.
    pub interrupted: bool,
}

impl SimulationReport {
    pub(crate) fn new(strategy: StrategyKind, layout: PartitionBoundary) -> Self {
        Self {
            strategy,
            workers: layout.worker_count(),
            boundary: layout.boundary(),
            ..Self::default()
        }
    }

    pub(crate) fn absorb(&mut self, outcome: ConnectionOutcome, layout: PartitionBoundary) {
        self.connections += 1;
        self.affinity_violations += outcome.affinity_violations;

        for worker in outcome.placements {
            self.requests += 1;
            if outcome.risky {
                self.risky_requests += 1;
            }
            match (outcome.risky, layout.partition_of(worker)) {
                (true, Partition::Risky) => self.risky_in_risky_partition += 1,
                (true, Partition::Safe) => self.risky_in_safe_partition += 1,
                (false, Partition::Risky) => self.safe_in_risky_partition += 1,
                (false, Partition::Safe) => {}
            }
        }

        for kind in outcome.errors {
            self.record_error(kind);
        }
    }

    pub(crate) fn record_error(&mut self, kind: &str) {
        *self.errors.entry(kind.to_string()).or_default() += 1;
    }

    /// Total failed dispatch calls.
    pub fn error_count(&self) -> u64 {
        self.errors.values().sum()
    }
}
