//! tidewater-api: JSON control API for a Tidewater node.
//!
//! Handlers translate requests into ticker, task queue and dispatcher
//! calls. Control operations go through the task queue and the handler
//! waits for the task's result.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/watermarks` | All initialized channel watermarks |
//! | GET | `/api/v1/watermarks/{channel}` | One channel's watermark |
//! | GET | `/api/v1/channels` | Tracked channels |
//! | POST | `/api/v1/channels` | Track a channel |
//! | DELETE | `/api/v1/channels/{channel}` | Stop tracking a channel |
//! | POST | `/api/v1/channels/{channel}/inflight` | Record an in-flight message |
//! | DELETE | `/api/v1/channels/{channel}/inflight/{ts}` | Mark a message flushed |
//! | POST | `/api/v1/tasks/watch-channels` | Watch DM channels |
//! | POST | `/api/v1/tasks/load-segments` | Load segments |
//! | POST | `/api/v1/tasks/release-collection` | Release a collection |
//! | POST | `/api/v1/tasks/release-partitions` | Release partitions |
//! | POST | `/api/v1/tasks/release-segments` | Release segments |
//! | POST | `/api/v1/tasks/add-query-channel` | Attach search channels |
//! | POST | `/api/v1/tasks/remove-query-channel` | Detach search channels |
//! | GET | `/api/v1/tasks/metrics` | Task counters |
//! | GET | `/api/v1/state` | Node state snapshot |
//! | GET | `/api/v1/health` | Component state |
//! | POST | `/api/v1/segments/info` | Segment lookup |
//! | GET | `/api/v1/workers` | Registered workers with load |
//! | POST | `/api/v1/workers` | Register a worker |
//! | DELETE | `/api/v1/workers/{id}` | Deregister a worker |
//! | PUT | `/api/v1/workers/{id}/load` | Heartbeat load report |
//! | POST | `/api/v1/jobs` | Assign a job to the least-loaded worker |
//! | POST | `/api/v1/jobs/{worker}/complete` | Finish a job |

pub mod handlers;
pub mod services;

pub use services::ComponentState;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};

use tide_core::{HybridClock, NodeId};
use tidewater_dispatch::{JobDispatcher, WorkerConnector, WorkerInfo};
use tidewater_tasks::TaskQueue;
use tidewater_ticker::{ChannelsTimeTicker, InFlightTracker, RetryingAllocator};

/// The ticker as assembled by a node: local clock behind retry, fed by the
/// in-flight tracker.
pub type NodeTicker = ChannelsTimeTicker<InFlightTracker, RetryingAllocator<HybridClock>>;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub node_id: NodeId,
    pub ticker: Arc<NodeTicker>,
    pub tracker: InFlightTracker,
    pub tasks: Arc<TaskQueue>,
    pub dispatcher: Arc<JobDispatcher<WorkerInfo>>,
    pub connector: WorkerConnector,
}

/// Build the API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/watermarks", get(handlers::list_watermarks))
        .route("/watermarks/{channel}", get(handlers::get_watermark))
        .route("/channels", get(handlers::list_channels).post(handlers::add_channel))
        .route("/channels/{channel}", delete(handlers::remove_channel))
        .route("/channels/{channel}/inflight", post(handlers::begin_inflight))
        .route("/channels/{channel}/inflight/{ts}", delete(handlers::finish_inflight))
        .route("/tasks/watch-channels", post(handlers::watch_channels))
        .route("/tasks/load-segments", post(handlers::load_segments))
        .route("/tasks/release-collection", post(handlers::release_collection))
        .route("/tasks/release-partitions", post(handlers::release_partitions))
        .route("/tasks/release-segments", post(handlers::release_segments))
        .route("/tasks/add-query-channel", post(handlers::add_query_channel))
        .route("/tasks/remove-query-channel", post(handlers::remove_query_channel))
        .route("/tasks/metrics", get(handlers::task_metrics))
        .route("/state", get(handlers::node_state))
        .route("/health", get(handlers::health))
        .route("/segments/info", post(handlers::segment_info))
        .route("/workers", get(handlers::list_workers).post(handlers::register_worker))
        .route("/workers/{id}", delete(handlers::deregister_worker))
        .route("/workers/{id}/load", put(handlers::report_load))
        .route("/jobs", post(handlers::assign_job))
        .route("/jobs/{worker}/complete", post(handlers::complete_job))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
