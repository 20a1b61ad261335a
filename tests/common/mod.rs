//! Shared utilities for integration tests.

use std::sync::atomic::{AtomicU8, Ordering};

use worker_dispatch::dispatch::{RiskPartitioned, StickyDispatcher, WorkerId};
use worker_dispatch::workers::{WorkerStatus, WorkerStatusOracle};

/// Deterministic worker pool whose statuses tests flip by hand.
#[derive(Debug)]
pub struct FakeWorkers {
    statuses: Vec<AtomicU8>,
}

impl FakeWorkers {
    /// `count` workers, all busy.
    pub fn busy(count: usize) -> Self {
        Self {
            statuses: (0..count)
                .map(|_| AtomicU8::new(WorkerStatus::Busy as u8))
                .collect(),
        }
    }

    /// `count` workers, only the listed indices idle.
    #[allow(dead_code)]
    pub fn with_idle(count: usize, idle: &[usize]) -> Self {
        let workers = Self::busy(count);
        for &i in idle {
            workers.set(i, WorkerStatus::Idle);
        }
        workers
    }

    pub fn set(&self, index: usize, status: WorkerStatus) {
        self.statuses[index].store(status as u8, Ordering::Release);
    }
}

impl WorkerStatusOracle for FakeWorkers {
    fn worker_count(&self) -> usize {
        self.statuses.len()
    }

    fn worker_status(&self, worker: WorkerId) -> WorkerStatus {
        self.statuses
            .get(worker.index())
            .map(|s| WorkerStatus::from(s.load(Ordering::Acquire)))
            .unwrap_or(WorkerStatus::Unknown)
    }
}

/// Classifies any request whose line contains "/export" as risky.
pub fn export_is_risky(request_line: &str, _domain: &str) -> bool {
    request_line.contains("/export")
}

pub type ExportDispatcher = StickyDispatcher<RiskPartitioned<fn(&str, &str) -> bool>>;

/// Sticky risk-partitioned dispatcher using [`export_is_risky`].
#[allow(dead_code)]
pub fn export_dispatcher(capacity: usize, risky_workers_percent: f64) -> ExportDispatcher {
    let classifier: fn(&str, &str) -> bool = export_is_risky;
    let strategy = RiskPartitioned::new(risky_workers_percent, classifier)
        .expect("percent within [0, 1]");
    StickyDispatcher::new(capacity, strategy)
}

pub const SAFE_REQUEST: &[u8] = b"GET /home HTTP/1.1\r\nHost: app.example.com\r\n\r\n";
pub const RISKY_REQUEST: &[u8] = b"GET /export?all=1 HTTP/1.1\r\nHost: app.example.com\r\n\r\n";
