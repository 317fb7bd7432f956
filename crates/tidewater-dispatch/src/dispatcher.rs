//! Coordinator-side job assignment.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use tide_core::{Address, NodeId};

use crate::error::{DispatchError, DispatchResult};
use crate::heap::WorkerEntry;
use crate::queue::LoadPriorityQueue;

/// What the coordinator keeps about a registered worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub node_id: NodeId,
    pub address: Address,
    /// Registration time, seconds since the epoch.
    pub registered_at: u64,
}

impl WorkerInfo {
    pub fn new(node_id: NodeId, address: Address) -> Self {
        Self {
            node_id,
            address,
            registered_at: epoch_secs(),
        }
    }
}

/// A job placed on a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment<T> {
    pub node_id: NodeId,
    pub address: Address,
    pub handle: T,
}

/// Sends each new job to the least-loaded worker.
///
/// Load scores count outstanding jobs and are overwritten by heartbeats
/// through [`report_load`](Self::report_load).
#[derive(Debug)]
pub struct JobDispatcher<T> {
    queue: LoadPriorityQueue<T>,
}

impl<T> Default for JobDispatcher<T> {
    fn default() -> Self {
        Self {
            queue: LoadPriorityQueue::default(),
        }
    }
}

impl<T: Clone> JobDispatcher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker with zero load.
    pub fn register(&self, node_id: NodeId, address: Address, handle: T) -> DispatchResult<()> {
        self.queue.push_unique(node_id, address.clone(), 0, handle)?;
        info!(node_id, %address, "worker registered");
        Ok(())
    }

    pub fn deregister(&self, node_id: NodeId) -> DispatchResult<WorkerEntry<T>> {
        let entry = self.queue.remove(node_id)?;
        info!(node_id, address = %entry.address, "worker removed");
        Ok(entry)
    }

    /// Pick the least-loaded worker and count one more job against it.
    pub fn assign(&self) -> DispatchResult<Assignment<T>> {
        let entry = self
            .queue
            .claim_least_loaded(1)
            .ok_or(DispatchError::NoWorkersAvailable)?;
        debug!(node_id = entry.node_id, load = entry.load + 1, "job assigned");
        Ok(Assignment {
            node_id: entry.node_id,
            address: entry.address,
            handle: entry.handle,
        })
    }

    /// A job on `node_id` finished. Returns the worker's new load.
    pub fn complete(&self, node_id: NodeId) -> DispatchResult<i64> {
        let load = self.queue.increase_priority(node_id, -1)?;
        debug!(node_id, load, "job completed");
        Ok(load)
    }

    /// Overwrite a worker's load from a heartbeat.
    pub fn report_load(&self, node_id: NodeId, load: i64) -> DispatchResult<()> {
        self.queue.set_priority(node_id, load)
    }

    pub fn least_loaded(&self) -> Option<(NodeId, T)> {
        self.queue.peek_least_loaded()
    }

    /// Handles of all registered workers.
    pub fn workers(&self) -> Vec<T> {
        self.queue.list_all()
    }

    /// All workers with their loads, least loaded first.
    pub fn entries(&self) -> Vec<WorkerEntry<T>> {
        self.queue.entries()
    }

    pub fn load_of(&self, node_id: NodeId) -> Option<i64> {
        self.queue.load_of(node_id)
    }

    pub fn is_registered(&self, address: &Address) -> bool {
        self.queue.contains_address(address)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(id: NodeId) -> (NodeId, Address, WorkerInfo) {
        let address = Address::new("10.0.0.7", 21000 + id as u16);
        (id, address.clone(), WorkerInfo::new(id, address))
    }

    fn dispatcher_with(ids: &[NodeId]) -> JobDispatcher<WorkerInfo> {
        let dispatcher = JobDispatcher::new();
        for &id in ids {
            let (id, address, info) = worker(id);
            dispatcher.register(id, address, info).unwrap();
        }
        dispatcher
    }

    #[test]
    fn assignments_spread_across_workers() {
        let dispatcher = dispatcher_with(&[1, 2, 3]);
        let mut picked: Vec<_> = (0..3).map(|_| dispatcher.assign().unwrap().node_id).collect();
        picked.sort();
        assert_eq!(picked, vec![1, 2, 3]);
        for id in [1, 2, 3] {
            assert_eq!(dispatcher.load_of(id), Some(1));
        }
    }

    #[test]
    fn completion_makes_worker_preferred_again() {
        let dispatcher = dispatcher_with(&[1, 2]);
        dispatcher.assign().unwrap();
        dispatcher.assign().unwrap();
        dispatcher.report_load(2, 5).unwrap();

        assert_eq!(dispatcher.complete(1).unwrap(), 0);
        assert_eq!(dispatcher.assign().unwrap().node_id, 1);
    }

    #[test]
    fn empty_pool_has_no_assignment() {
        let dispatcher: JobDispatcher<WorkerInfo> = JobDispatcher::new();
        assert!(matches!(dispatcher.assign(), Err(DispatchError::NoWorkersAvailable)));
        assert!(dispatcher.least_loaded().is_none());
    }

    #[test]
    fn register_rejects_duplicates() {
        let dispatcher = dispatcher_with(&[1]);
        let (_, address, info) = worker(1);
        assert!(matches!(
            dispatcher.register(9, address, info.clone()),
            Err(DispatchError::AddressInUse(_))
        ));
        assert!(matches!(
            dispatcher.register(1, Address::new("10.0.0.8", 1), info),
            Err(DispatchError::AlreadyRegistered(1))
        ));
        assert_eq!(dispatcher.workers().len(), 1);
    }

    #[test]
    fn deregister_removes_from_rotation() {
        let dispatcher = dispatcher_with(&[1, 2]);
        let removed = dispatcher.deregister(1).unwrap();
        assert_eq!(removed.handle.node_id, 1);
        assert!(!dispatcher.is_registered(&removed.address));

        assert_eq!(dispatcher.assign().unwrap().node_id, 2);
        assert!(matches!(dispatcher.deregister(1), Err(DispatchError::NodeNotFound(1))));
    }
}
