//! Connection affinity table.
//!
//! # Responsibilities
//! - Map live connection ids to the worker they were pinned to
//! - Bound the number of live entries to the host's connection limit
//! - Stay safe under concurrent dispatch for distinct connections
//!
//! # Design Decisions
//! - Sharded map (DashMap): unrelated connections never share a lock
//! - Capacity is enforced by an atomic live counter, not by the map
//! - A full table rejects new keys; the caller decides what that means

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::dispatch::{ConnectionId, DispatchError, WorkerId};

/// Fixed-capacity concurrent map from connection to pinned worker.
#[derive(Debug)]
pub struct AffinityTable {
    entries: DashMap<ConnectionId, WorkerId>,
    /// Slots reserved by live entries. May briefly exceed `entries.len()`
    /// while an insert is in progress, never `capacity`.
    live: AtomicUsize,
    capacity: usize,
}

impl AffinityTable {
    /// Create a table sized for `capacity` concurrent connections.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
            live: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn exists(&self, connection: ConnectionId) -> bool {
        self.entries.contains_key(&connection)
    }

    pub fn get(&self, connection: ConnectionId) -> Option<WorkerId> {
        self.entries.get(&connection).map(|entry| *entry.value())
    }

    /// Pin `connection` to `worker`, overwriting any previous pin.
    ///
    /// Overwriting does not consume capacity; a new key fails with
    /// `AffinityTableFull` once `capacity` connections are live.
    pub fn set(&self, connection: ConnectionId, worker: WorkerId) -> Result<(), DispatchError> {
        match self.entries.entry(connection) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(worker);
            }
            Entry::Vacant(vacant) => {
                self.try_reserve()?;
                vacant.insert(worker);
            }
        }
        Ok(())
    }

    /// Pin `connection` to `worker` unless it is already pinned.
    ///
    /// Returns the worker actually stored, so concurrent callers racing on
    /// the same connection all observe the first writer's choice.
    pub fn insert_if_absent(
        &self,
        connection: ConnectionId,
        worker: WorkerId,
    ) -> Result<WorkerId, DispatchError> {
        match self.entries.entry(connection) {
            Entry::Occupied(occupied) => Ok(*occupied.get()),
            Entry::Vacant(vacant) => {
                self.try_reserve()?;
                vacant.insert(worker);
                Ok(worker)
            }
        }
    }

    /// Remove the pin for `connection`, returning the worker it held.
    pub fn delete(&self, connection: ConnectionId) -> Option<WorkerId> {
        let (_, worker) = self.entries.remove(&connection)?;
        self.live.fetch_sub(1, Ordering::AcqRel);
        Some(worker)
    }

    /// Number of live entries, read from the reservation counter.
    ///
    /// Never touches the shards, so it is safe on the dispatch path. An insert
    /// in progress is already counted.
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn try_reserve(&self) -> Result<(), DispatchError> {
        let mut prev = self.live.load(Ordering::Acquire);
        loop {
            if prev >= self.capacity {
                return Err(DispatchError::AffinityTableFull {
                    capacity: self.capacity,
                });
            }
            match self.live.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(current) => prev = current,
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn entries(&self) -> &DashMap<ConnectionId, WorkerId> {
        &self.entries
    }
}
