//! Task outcome counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::error::{TaskError, TaskResult};
use crate::task::TaskKind;

/// Lock-free counters updated by the executor.
#[derive(Debug, Default)]
pub struct TaskMetrics {
    enqueued: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    /// Tasks that reached `execute`, indexed by [`TaskKind`].
    executed_by_kind: [AtomicU64; TaskKind::ALL.len()],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskMetricsSnapshot {
    pub enqueued: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rejected: u64,
    pub executed_by_kind: Vec<(TaskKind, u64)>,
}

impl TaskMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record(&self, kind: TaskKind, result: &TaskResult<()>) {
        match result {
            Ok(()) => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Err(TaskError::Validation(_)) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.executed_by_kind[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TaskMetricsSnapshot {
        TaskMetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            executed_by_kind: TaskKind::ALL
                .iter()
                .map(|k| (*k, self.executed_by_kind[k.index()].load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failures_are_not_executions() {
        let metrics = TaskMetrics::new();
        metrics.record(TaskKind::LoadSegments, &Ok(()));
        metrics.record(TaskKind::LoadSegments, &Err(TaskError::SegmentAlreadyLoaded(1)));
        metrics.record(TaskKind::WatchChannels, &Err(TaskError::Validation("empty".into())));

        let snap = metrics.snapshot();
        assert_eq!((snap.succeeded, snap.failed, snap.rejected), (1, 1, 1));
        assert_eq!(snap.executed_by_kind[TaskKind::LoadSegments.index()].1, 2);
        assert_eq!(snap.executed_by_kind[TaskKind::WatchChannels.index()].1, 0);
    }
}
