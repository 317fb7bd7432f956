//! Thread-safe least-loaded worker queue.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tide_core::{Address, NodeId};

use crate::error::{DispatchError, DispatchResult};
use crate::heap::{Heap, WorkerEntry};

/// Workers keyed by identity, ordered by ascending load.
///
/// Mutations take the write lock; `peek`, `list_all` and
/// `contains_address` share the read lock.
#[derive(Debug)]
pub struct LoadPriorityQueue<T> {
    heap: RwLock<Heap<T>>,
}

impl<T> Default for LoadPriorityQueue<T> {
    fn default() -> Self {
        Self {
            heap: RwLock::new(Heap::new()),
        }
    }
}

impl<T: Clone> LoadPriorityQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Heap<T>> {
        self.heap.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Heap<T>> {
        self.heap.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, node_id: NodeId, address: Address, load: i64, handle: T) -> DispatchResult<()> {
        let mut heap = self.write();
        if heap.position(node_id).is_some() {
            return Err(DispatchError::AlreadyRegistered(node_id));
        }
        heap.push(WorkerEntry {
            node_id,
            address,
            load,
            handle,
        });
        Ok(())
    }

    /// Like [`push`](Self::push), but also rejects an address already in
    /// the pool. Both checks and the insert happen under one lock.
    pub fn push_unique(
        &self,
        node_id: NodeId,
        address: Address,
        load: i64,
        handle: T,
    ) -> DispatchResult<()> {
        let mut heap = self.write();
        if heap.items().iter().any(|e| e.address == address) {
            return Err(DispatchError::AddressInUse(address));
        }
        if heap.position(node_id).is_some() {
            return Err(DispatchError::AlreadyRegistered(node_id));
        }
        heap.push(WorkerEntry {
            node_id,
            address,
            load,
            handle,
        });
        Ok(())
    }

    /// Add `delta` to a worker's load. Returns the new load.
    pub fn increase_priority(&self, node_id: NodeId, delta: i64) -> DispatchResult<i64> {
        let mut heap = self.write();
        let i = heap
            .position(node_id)
            .ok_or(DispatchError::NodeNotFound(node_id))?;
        let load = heap.items()[i].load.saturating_add(delta);
        heap.set_load(i, load);
        Ok(load)
    }

    pub fn set_priority(&self, node_id: NodeId, load: i64) -> DispatchResult<()> {
        let mut heap = self.write();
        let i = heap
            .position(node_id)
            .ok_or(DispatchError::NodeNotFound(node_id))?;
        heap.set_load(i, load);
        Ok(())
    }

    pub fn remove(&self, node_id: NodeId) -> DispatchResult<WorkerEntry<T>> {
        let mut heap = self.write();
        heap.position(node_id)
            .and_then(|i| heap.remove(i))
            .ok_or(DispatchError::NodeNotFound(node_id))
    }

    /// The least-loaded worker, if any.
    pub fn peek(&self) -> Option<WorkerEntry<T>> {
        self.read().peek().cloned()
    }

    /// Identity and handle of the least-loaded worker.
    pub fn peek_least_loaded(&self) -> Option<(NodeId, T)> {
        self.read()
            .peek()
            .map(|e| (e.node_id, e.handle.clone()))
    }

    /// Pick the least-loaded worker and add `delta` to its load in one step.
    ///
    /// Returns the entry with its load before the increment.
    pub fn claim_least_loaded(&self, delta: i64) -> Option<WorkerEntry<T>> {
        let mut heap = self.write();
        let claimed = heap.peek().cloned()?;
        heap.set_load(0, claimed.load.saturating_add(delta));
        Some(claimed)
    }

    /// Handles of every worker, in no particular order.
    pub fn list_all(&self) -> Vec<T> {
        self.read().items().iter().map(|e| e.handle.clone()).collect()
    }

    /// Every entry, least loaded first.
    pub fn entries(&self) -> Vec<WorkerEntry<T>> {
        let mut entries = self.read().items().to_vec();
        entries.sort_by_key(|e| (e.load, e.node_id));
        entries
    }

    pub fn load_of(&self, node_id: NodeId) -> Option<i64> {
        let heap = self.read();
        heap.position(node_id)
            .and_then(|i| heap.get(i))
            .map(|e| e.load)
    }

    pub fn contains_address(&self, address: &Address) -> bool {
        self.read().items().iter().any(|e| &e.address == address)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
