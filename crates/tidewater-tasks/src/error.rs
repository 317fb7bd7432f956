//! Task error types.

use std::time::Duration;

use thiserror::Error;

use tide_core::{ChannelName, CollectionId, SegmentId};

/// Errors delivered through a task's completion signal.
///
/// `Clone` so that every reader of a completion observes the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("channel already watched: {0}")]
    ChannelAlreadyWatched(ChannelName),

    #[error("collection not found: {0}")]
    CollectionNotFound(CollectionId),

    #[error("segment already loaded: {0}")]
    SegmentAlreadyLoaded(SegmentId),

    #[error("segment not found: {0}")]
    SegmentNotFound(SegmentId),

    #[error("collection {0} already has a query channel")]
    QueryChannelExists(CollectionId),

    #[error("no matching query channel for collection {0}")]
    QueryChannelNotFound(CollectionId),

    #[error("task queue is closed")]
    QueueClosed,

    #[error("no task result after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("task dropped before completing")]
    Abandoned,

    #[error("task panicked: {0}")]
    Panicked(String),
}

pub type TaskResult<T> = Result<T, TaskError>;
