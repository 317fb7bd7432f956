//! Typed binary min-heap over worker entries, ordered by load.
//!
//! Entries are looked up by identity with a linear scan. Pools are small
//! enough that this beats maintaining a side index.

use serde::Serialize;

use tide_core::{Address, NodeId};

/// One worker in the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerEntry<T> {
    pub node_id: NodeId,
    pub address: Address,
    /// Lower is preferred. May go negative.
    pub load: i64,
    pub handle: T,
}

#[derive(Debug)]
pub struct Heap<T> {
    items: Vec<WorkerEntry<T>>,
}

impl<T> Default for Heap<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Heap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[WorkerEntry<T>] {
        &self.items
    }

    pub fn get(&self, i: usize) -> Option<&WorkerEntry<T>> {
        self.items.get(i)
    }

    /// The least-loaded entry.
    pub fn peek(&self) -> Option<&WorkerEntry<T>> {
        self.items.first()
    }

    pub fn position(&self, node_id: NodeId) -> Option<usize> {
        self.items.iter().position(|e| e.node_id == node_id)
    }

    pub fn less(&self, i: usize, j: usize) -> bool {
        self.items[i].load < self.items[j].load
    }

    pub fn swap(&mut self, i: usize, j: usize) {
        self.items.swap(i, j);
    }

    pub fn push(&mut self, entry: WorkerEntry<T>) {
        self.items.push(entry);
        self.up(self.items.len() - 1);
    }

    /// Remove and return the entry at `i`.
    pub fn remove(&mut self, i: usize) -> Option<WorkerEntry<T>> {
        if i >= self.items.len() {
            return None;
        }
        let last = self.items.len() - 1;
        self.swap(i, last);
        let removed = self.items.pop();
        if i < self.items.len() {
            self.fix(i);
        }
        removed
    }

    /// Change the load at `i` and restore heap order.
    pub fn set_load(&mut self, i: usize, load: i64) {
        self.items[i].load = load;
        self.fix(i);
    }

    /// Re-establish heap order after the entry at `i` changed.
    pub fn fix(&mut self, i: usize) {
        if !self.down(i) {
            self.up(i);
        }
    }

    fn up(&mut self, mut j: usize) {
        while j > 0 {
            let parent = (j - 1) / 2;
            if !self.less(j, parent) {
                break;
            }
            self.swap(parent, j);
            j = parent;
        }
    }

    /// Sift down from `i0`. Returns whether the entry moved.
    fn down(&mut self, i0: usize) -> bool {
        let n = self.items.len();
        let mut i = i0;
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let mut child = left;
            let right = left + 1;
            if right < n && self.less(right, left) {
                child = right;
            }
            if !self.less(child, i) {
                break;
            }
            self.swap(i, child);
            i = child;
        }
        i > i0
    }
}
