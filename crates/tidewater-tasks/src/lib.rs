//! tidewater-tasks: ordered control operations against node-local state.
//!
//! Request handlers wrap each control operation in a [`NodeTask`], enqueue
//! it, and wait on its completion. A single executor applies tasks in
//! submission order, so task bodies mutate [`NodeState`] without locking
//! of their own.
//!
//! # Architecture
//!
//! ```text
//! handler ─┐
//! handler ─┼─► enqueue (seq++) ─► mpsc ─► executor ─► validate
//! handler ─┘        │                                    │
//!                   ▼                                 execute (&mut NodeState)
//!              TaskHandle ◄──── completion ◄──── notify (metrics, observer)
//! ```
//!
//! A caller that stops waiting gets [`TaskError::DeadlineExceeded`]; the
//! task itself still runs to completion.

pub mod completion;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod state;
pub mod task;

pub use completion::{Completer, Completion, completion};
pub use error::{TaskError, TaskResult};
pub use metrics::{TaskMetrics, TaskMetricsSnapshot};
pub use queue::{QueueConfig, TaskHandle, TaskObserver, TaskQueue};
pub use state::{NodeState, QueryChannel, SegmentInfo, WatchedChannel};
pub use task::{
    AddQueryChannelRequest, LoadSegmentsRequest, NodeTask, ReleaseCollectionRequest,
    ReleasePartitionsRequest, ReleaseSegmentsRequest, RemoveQueryChannelRequest, TaskContext,
    TaskKind, WatchChannelsRequest,
};
