//! tidewater-dispatch: assigns background jobs to the least-loaded worker.
//!
//! ```text
//! membership watcher ──register/deregister──┐
//! heartbeats ─────────report_load───────────┤
//!                                           ▼
//!                      JobDispatcher ── LoadPriorityQueue (min-heap on load)
//!                           │
//!                     assign() / complete()
//!                           │
//!                           ▼
//!                    WorkerConnector ── retry ──► worker
//! ```

pub mod connector;
pub mod dispatcher;
pub mod error;
pub mod heap;
pub mod queue;

pub use connector::WorkerConnector;
pub use dispatcher::{Assignment, JobDispatcher, WorkerInfo};
pub use error::{DispatchError, DispatchResult};
pub use heap::{Heap, WorkerEntry};
pub use queue::LoadPriorityQueue;
