//! Sticky dispatch: connection affinity around a resolution strategy.
//!
//! # Responsibilities
//! - Route every event of a connection to the worker chosen for its first event
//! - Delegate the first choice to a `ResolveWorker`
//! - Drop the affinity entry once the connection closes
//!
//! # Design Decisions
//! - Lookup happens before any cleanup, so a close for an unseen connection still resolves
//! - Concurrent first events for one connection converge on the first stored choice
//! - Table overflow follows an explicit `OverflowPolicy`

use serde::{Deserialize, Serialize};

use crate::dispatch::affinity::AffinityTable;
use crate::dispatch::{ConnectionId, Dispatch, DispatchError, DispatchKind, ResolveWorker, WorkerId};
use crate::observability::metrics;
use crate::workers::WorkerStatusOracle;

/// What to do when a new connection arrives and the affinity table is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Fail the dispatch with `AffinityTableFull`.
    #[default]
    Reject,
    /// Return the resolved worker without pinning the connection.
    Unpinned,
}

/// Dispatcher pinning each connection to the worker resolved for its first event.
#[derive(Debug)]
pub struct StickyDispatcher<R> {
    table: AffinityTable,
    resolver: R,
    overflow: OverflowPolicy,
}

impl<R: ResolveWorker> StickyDispatcher<R> {
    /// `capacity` should match the host's maximum concurrent connections.
    pub fn new(capacity: usize, resolver: R) -> Self {
        Self::with_overflow(capacity, resolver, OverflowPolicy::default())
    }

    pub fn with_overflow(capacity: usize, resolver: R, overflow: OverflowPolicy) -> Self {
        tracing::info!(
            capacity,
            strategy = resolver.name(),
            overflow = ?overflow,
            "Sticky dispatcher created"
        );
        Self {
            table: AffinityTable::new(capacity),
            resolver,
            overflow,
        }
    }

    pub fn table(&self) -> &AffinityTable {
        &self.table
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow
    }

    fn pin(&self, connection: ConnectionId, resolved: WorkerId) -> Result<WorkerId, DispatchError> {
        match self.table.insert_if_absent(connection, resolved) {
            Ok(worker) => {
                metrics::record_affinity_entries(self.table.len());
                Ok(worker)
            }
            Err(DispatchError::AffinityTableFull { capacity })
                if self.overflow == OverflowPolicy::Unpinned =>
            {
                tracing::warn!(
                    connection = %connection,
                    worker = %resolved,
                    capacity,
                    "Affinity table full, serving connection unpinned"
                );
                metrics::record_affinity_overflow();
                Ok(resolved)
            }
            Err(e) => Err(e),
        }
    }

    fn decide(
        &self,
        workers: &dyn WorkerStatusOracle,
        connection: ConnectionId,
        kind: DispatchKind,
        payload: Option<&[u8]>,
    ) -> Result<WorkerId, DispatchError> {
        if let Some(worker) = self.table.get(connection) {
            tracing::trace!(
                connection = %connection,
                worker = %worker,
                kind = %kind,
                "Affinity hit"
            );
            metrics::record_decision("affinity");
            return Ok(worker);
        }

        let resolved = self.resolver.resolve(workers, payload)?;
        metrics::record_decision("resolved");

        // A close for an unseen connection would be stored and removed at once.
        if kind == DispatchKind::Close {
            return Ok(resolved);
        }
        self.pin(connection, resolved)
    }
}

impl<R: ResolveWorker> Dispatch for StickyDispatcher<R> {
    fn dispatch(
        &self,
        workers: &dyn WorkerStatusOracle,
        connection: ConnectionId,
        kind: DispatchKind,
        payload: Option<&[u8]>,
    ) -> Result<WorkerId, DispatchError> {
        let result = self.decide(workers, connection, kind, payload);

        if kind == DispatchKind::Close && self.table.delete(connection).is_some() {
            tracing::trace!(connection = %connection, "Affinity entry removed");
            metrics::record_affinity_entries(self.table.len());
        }

        if let Err(e) = &result {
            tracing::warn!(connection = %connection, kind = %kind, error = %e, "Dispatch failed");
            metrics::record_error(e.kind());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchEvent, RoundRobin};
    use crate::workers::{StaticWorkers, WorkerStatus};

    #[test]
    fn test_sticks_to_first_worker() {
        let dispatcher = StickyDispatcher::new(16, RoundRobin::new());
        let workers = StaticWorkers::all(4, WorkerStatus::Busy);
        let conn = ConnectionId(3);

        let first = dispatcher
            .dispatch_event(&workers, DispatchEvent::start(conn))
            .unwrap();
        for _ in 0..5 {
            let next = dispatcher
                .dispatch_event(&workers, DispatchEvent::fetch(conn, b"GET / HTTP/1.1\r\n\r\n"))
                .unwrap();
            assert_eq!(next, first);
        }
        assert_eq!(dispatcher.dispatch_event(&workers, DispatchEvent::close(conn)), Ok(first));
        assert!(!dispatcher.table().exists(conn));
    }

    #[test]
    fn test_close_unseen_connection_resolves() {
        let dispatcher = StickyDispatcher::new(16, RoundRobin::new());
        let workers = StaticWorkers::with_idle(3, &[1]);

        let worker = dispatcher
            .dispatch(&workers, ConnectionId(99), DispatchKind::Close, None)
            .unwrap();
        assert_eq!(worker, WorkerId(1));
        assert!(dispatcher.table().is_empty());
    }

    #[test]
    fn test_reused_id_is_resolved_again() {
        let dispatcher = StickyDispatcher::new(16, RoundRobin::new());
        let busy = StaticWorkers::all(4, WorkerStatus::Busy);
        let conn = ConnectionId(5);

        assert_eq!(dispatcher.dispatch_event(&busy, DispatchEvent::start(conn)), Ok(WorkerId(0)));
        assert_eq!(dispatcher.dispatch_event(&busy, DispatchEvent::close(conn)), Ok(WorkerId(0)));

        // Rotation moved on, so a stale entry would show up as worker 0
        assert_eq!(dispatcher.dispatch_event(&busy, DispatchEvent::start(conn)), Ok(WorkerId(1)));
    }

    #[test]
    fn test_overflow_reject() {
        let dispatcher = StickyDispatcher::new(1, RoundRobin::new());
        let workers = StaticWorkers::all(2, WorkerStatus::Idle);

        dispatcher.dispatch_event(&workers, DispatchEvent::start(ConnectionId(1))).unwrap();
        assert_eq!(
            dispatcher.dispatch_event(&workers, DispatchEvent::start(ConnectionId(2))),
            Err(DispatchError::AffinityTableFull { capacity: 1 })
        );

        // Closing the unseen connection still works while the table is full
        assert!(dispatcher
            .dispatch_event(&workers, DispatchEvent::close(ConnectionId(2)))
            .is_ok());
    }

    #[test]
    fn test_overflow_unpinned() {
        let dispatcher =
            StickyDispatcher::with_overflow(1, RoundRobin::new(), OverflowPolicy::Unpinned);
        let workers = StaticWorkers::all(2, WorkerStatus::Idle);

        dispatcher.dispatch_event(&workers, DispatchEvent::start(ConnectionId(1))).unwrap();
        let worker = dispatcher
            .dispatch_event(&workers, DispatchEvent::start(ConnectionId(2)))
            .unwrap();
        assert!(worker.index() < 2);
        assert!(!dispatcher.table().exists(ConnectionId(2)));
        assert_eq!(dispatcher.table().len(), 1);
    }

    #[test]
    fn test_resolver_error_propagates() {
        let dispatcher = StickyDispatcher::new(4, RoundRobin::new());
        let empty = StaticWorkers(vec![]);
        assert_eq!(
            dispatcher.dispatch_event(&empty, DispatchEvent::start(ConnectionId(1))),
            Err(DispatchError::EmptyWorkerPool)
        );
        assert!(dispatcher.table().is_empty());
    }

    #[test]
    fn test_unrelated_connection_not_blocked_by_locked_shard() {
        use std::sync::{mpsc, Arc};
        use std::thread;
        use std::time::Duration;

        let dispatcher = Arc::new(StickyDispatcher::new(64, RoundRobin::new()));
        let workers = StaticWorkers::all(4, WorkerStatus::Busy);
        let pinned = ConnectionId(1);
        dispatcher.dispatch_event(&workers, DispatchEvent::start(pinned)).unwrap();

        let remote = dispatcher.clone();
        let guard = dispatcher.table().entries().get_mut(&pinned).unwrap();
        let other = (2..1_000)
            .map(ConnectionId)
            .find(|conn| dispatcher.table().entries().try_get(conn).is_absent())
            .unwrap();

        // Start, fetch and close for `other` while `pinned`'s shard is write-locked
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let start = remote.dispatch_event(&workers, DispatchEvent::start(other));
            let fetch = remote.dispatch_event(&workers, DispatchEvent::fetch(other, b"GET /"));
            let close = remote.dispatch_event(&workers, DispatchEvent::close(other));
            tx.send((start, fetch, close)).unwrap();
        });

        let (start, fetch, close) = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("dispatch for an unrelated connection blocked on a locked shard");
        drop(guard);
        handle.join().unwrap();

        let worker = start.unwrap();
        assert_eq!(fetch, Ok(worker));
        assert_eq!(close, Ok(worker));
        assert_eq!(dispatcher.table().len(), 1);
    }

    #[test]
    fn test_overflow_policy_serde() {
        let policy: OverflowPolicy = serde_json::from_str("\"unpinned\"").unwrap();
        assert_eq!(policy, OverflowPolicy::Unpinned);
        assert_eq!(serde_json::to_string(&OverflowPolicy::Reject).unwrap(), "\"reject\"");
    }
}
