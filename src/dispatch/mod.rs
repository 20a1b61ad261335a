//! Connection dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Host event (connection id, kind, payload)
//!     → sticky.rs (affinity lookup in affinity.rs)
//!         - hit: return the pinned worker
//!         - miss: ask a resolution strategy:
//!             - risk.rs (request.rs extracts request line + host,
//!               classifier decides risky/safe, partitioned idle scan)
//!             - round_robin.rs (rotate through workers)
//!           → pin the result in affinity.rs
//!     → Close event: drop the pin after the decision
//!     → Return worker index to the host
//! ```
//!
//! # Design Decisions
//! - Dispatch is synchronous and never blocks; the only shared state is the affinity table
//! - Worker status is read through an injected oracle, never owned
//! - Resolution strategies are pluggable behind `ResolveWorker`
//! - Errors are configuration faults, surfaced to the host rather than retried

pub mod affinity;
pub mod builder;
pub mod request;
pub mod risk;
pub mod round_robin;
pub mod sticky;

use std::fmt;
use std::ops::Range;

use rand::Rng;
use thiserror::Error;

use crate::workers::WorkerStatusOracle;

pub use affinity::AffinityTable;
pub use builder::build_dispatcher;
pub use request::RequestHead;
pub use risk::{PartitionBoundary, RiskPartitioned};
pub use round_robin::RoundRobin;
pub use sticky::{OverflowPolicy, StickyDispatcher};

/// Host-supplied connection identifier (the socket descriptor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(fd: u64) -> Self {
        Self(fd)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Index of a worker process in `[0, worker_count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub usize);

impl WorkerId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for WorkerId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Lifecycle event kind, with the codes the host passes to its dispatch callback.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKind {
    /// Connection closed; the affinity entry is dropped after the decision.
    Close = 4,
    /// Connection accepted, no data yet.
    Start = 5,
    /// Data arrived on the connection.
    Fetch = 10,
}

impl DispatchKind {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DispatchKind::Close => "close",
            DispatchKind::Start => "start",
            DispatchKind::Fetch => "fetch",
        }
    }
}

impl TryFrom<i32> for DispatchKind {
    type Error = DispatchError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            4 => Ok(DispatchKind::Close),
            5 => Ok(DispatchKind::Start),
            10 => Ok(DispatchKind::Fetch),
            other => Err(DispatchError::UnknownEventKind(other)),
        }
    }
}

impl fmt::Display for DispatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle event delivered by the host.
#[derive(Debug, Clone, Copy)]
pub struct DispatchEvent<'a> {
    pub connection: ConnectionId,
    pub kind: DispatchKind,
    pub payload: Option<&'a [u8]>,
}

impl<'a> DispatchEvent<'a> {
    pub fn start(connection: ConnectionId) -> Self {
        Self {
            connection,
            kind: DispatchKind::Start,
            payload: None,
        }
    }

    pub fn fetch(connection: ConnectionId, payload: &'a [u8]) -> Self {
        Self {
            connection,
            kind: DispatchKind::Fetch,
            payload: Some(payload),
        }
    }

    pub fn close(connection: ConnectionId) -> Self {
        Self {
            connection,
            kind: DispatchKind::Close,
            payload: None,
        }
    }
}

/// Sub-pool of workers in the risk-partitioned layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Indices below the boundary.
    Safe,
    /// Indices at or above the boundary.
    Risky,
}

impl Partition {
    pub fn as_str(self) -> &'static str {
        match self {
            Partition::Safe => "safe",
            Partition::Risky => "risky",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while dispatching.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// Strategy parameters are out of range.
    #[error("Invalid dispatcher configuration: {0}")]
    InvalidConfiguration(String),

    /// The host reported zero workers.
    #[error("Worker pool is empty")]
    EmptyWorkerPool,

    /// The fallback range for a partition holds no workers.
    #[error("No workers in the {partition} partition to fall back to")]
    EmptyPartition { partition: Partition },

    /// The affinity table already holds `capacity` live connections.
    #[error("Affinity table full ({capacity} live connections)")]
    AffinityTableFull { capacity: usize },

    /// The host passed an event code outside start/fetch/close.
    #[error("Unknown dispatch event code {0}")]
    UnknownEventKind(i32),
}

impl DispatchError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::InvalidConfiguration(_) => "invalid_configuration",
            DispatchError::EmptyWorkerPool => "empty_worker_pool",
            DispatchError::EmptyPartition { .. } => "empty_partition",
            DispatchError::AffinityTableFull { .. } => "affinity_table_full",
            DispatchError::UnknownEventKind(_) => "unknown_event_kind",
        }
    }
}

/// A dispatch strategy: decides which worker owns each connection event.
pub trait Dispatch: Send + Sync {
    /// Resolve the worker for one lifecycle event of `connection`.
    fn dispatch(
        &self,
        workers: &dyn WorkerStatusOracle,
        connection: ConnectionId,
        kind: DispatchKind,
        payload: Option<&[u8]>,
    ) -> Result<WorkerId, DispatchError>;

    fn dispatch_event(
        &self,
        workers: &dyn WorkerStatusOracle,
        event: DispatchEvent<'_>,
    ) -> Result<WorkerId, DispatchError> {
        self.dispatch(workers, event.connection, event.kind, event.payload)
    }
}

/// Picks a worker for a connection that has no affinity yet.
pub trait ResolveWorker: Send + Sync {
    fn resolve(
        &self,
        workers: &dyn WorkerStatusOracle,
        payload: Option<&[u8]>,
    ) -> Result<WorkerId, DispatchError>;

    /// Strategy label for logs and metrics.
    fn name(&self) -> &'static str;
}

impl<R: ResolveWorker + ?Sized> ResolveWorker for Box<R> {
    fn resolve(
        &self,
        workers: &dyn WorkerStatusOracle,
        payload: Option<&[u8]>,
    ) -> Result<WorkerId, DispatchError> {
        (**self).resolve(workers, payload)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Return the worker count, failing fast on an empty pool.
pub(crate) fn require_workers(workers: &dyn WorkerStatusOracle) -> Result<usize, DispatchError> {
    match workers.worker_count() {
        0 => Err(DispatchError::EmptyWorkerPool),
        n => Ok(n),
    }
}

/// First idle worker in `range`, scanning in ascending order.
pub(crate) fn first_idle(
    workers: &dyn WorkerStatusOracle,
    range: Range<usize>,
) -> Option<WorkerId> {
    range.map(WorkerId).find(|&worker| workers.is_idle(worker))
}

/// Uniformly random worker in `range`, or `None` when the range is empty.
pub(crate) fn random_in(range: Range<usize>) -> Option<WorkerId> {
    if range.is_empty() {
        return None;
    }
    Some(WorkerId(rand::thread_rng().gen_range(range)))
}
