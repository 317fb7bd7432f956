//! REST API handlers.
//!
//! Every response uses the `{ success, data?, error? }` envelope.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use tide_core::{Address, ChannelName, NodeId, SegmentId, Timestamp};
use tidewater_dispatch::{DispatchError, WorkerInfo};
use tidewater_tasks::{
    AddQueryChannelRequest, LoadSegmentsRequest, NodeTask, ReleaseCollectionRequest,
    ReleasePartitionsRequest, ReleaseSegmentsRequest, RemoveQueryChannelRequest, TaskError,
    WatchChannelsRequest,
};
use tidewater_ticker::TickerError;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn ticker_error(e: &TickerError) -> Response {
    let status = match e {
        TickerError::ChannelExists(_) | TickerError::AlreadyStarted => StatusCode::CONFLICT,
        TickerError::ChannelNotFound(_) => StatusCode::NOT_FOUND,
        TickerError::Statistics(_) | TickerError::Allocation(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    error_response(&e.to_string(), status)
}

fn task_error(e: &TaskError) -> Response {
    let status = match e {
        TaskError::Validation(_) => StatusCode::BAD_REQUEST,
        TaskError::ChannelAlreadyWatched(_)
        | TaskError::SegmentAlreadyLoaded(_)
        | TaskError::QueryChannelExists(_) => StatusCode::CONFLICT,
        TaskError::CollectionNotFound(_)
        | TaskError::SegmentNotFound(_)
        | TaskError::QueryChannelNotFound(_) => StatusCode::NOT_FOUND,
        TaskError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
        TaskError::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
        TaskError::Abandoned | TaskError::Panicked(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status)
}

fn dispatch_error(e: &DispatchError) -> Response {
    let status = match e {
        DispatchError::NodeNotFound(_) => StatusCode::NOT_FOUND,
        DispatchError::AlreadyRegistered(_) | DispatchError::AddressInUse(_) => StatusCode::CONFLICT,
        DispatchError::NoWorkersAvailable => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
        DispatchError::Connect { .. } | DispatchError::ConnectTimeout(_) => StatusCode::BAD_GATEWAY,
    };
    error_response(&e.to_string(), status)
}

// ── Watermarks ─────────────────────────────────────────────────

/// GET /api/v1/watermarks
pub async fn list_watermarks(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.ticker.get_all_watermarks().await)
}

/// GET /api/v1/watermarks/{channel}
pub async fn get_watermark(
    State(state): State<ApiState>,
    Path(channel): Path<String>,
) -> impl IntoResponse {
    match state.ticker.get_last_tick(&channel).await {
        Ok(ts) => ApiResponse::ok(json!({ "channel": channel, "watermark": ts })).into_response(),
        Err(e) => ticker_error(&e),
    }
}

// ── Channels ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AddChannelRequest {
    pub channel: ChannelName,
}

#[derive(Debug, Deserialize)]
pub struct InFlightRequest {
    pub ts: Timestamp,
}

/// GET /api/v1/channels
pub async fn list_channels(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.ticker.channels().await)
}

/// POST /api/v1/channels
pub async fn add_channel(
    State(state): State<ApiState>,
    Json(req): Json<AddChannelRequest>,
) -> impl IntoResponse {
    if req.channel.is_empty() {
        return error_response("channel name is empty", StatusCode::BAD_REQUEST);
    }
    match state.ticker.add_channel(&req.channel).await {
        Ok(()) => (StatusCode::CREATED, ApiResponse::ok(req.channel)).into_response(),
        Err(e) => ticker_error(&e),
    }
}

/// DELETE /api/v1/channels/{channel}
pub async fn remove_channel(
    State(state): State<ApiState>,
    Path(channel): Path<String>,
) -> impl IntoResponse {
    match state.ticker.remove_channel(&channel).await {
        Ok(()) => ApiResponse::ok("removed").into_response(),
        Err(e) => ticker_error(&e),
    }
}

/// POST /api/v1/channels/{channel}/inflight
pub async fn begin_inflight(
    State(state): State<ApiState>,
    Path(channel): Path<String>,
    Json(req): Json<InFlightRequest>,
) -> impl IntoResponse {
    state.tracker.begin(&channel, req.ts);
    ApiResponse::ok(json!({ "channel": channel, "pending": state.tracker.pending(&channel) }))
}

/// DELETE /api/v1/channels/{channel}/inflight/{ts}
pub async fn finish_inflight(
    State(state): State<ApiState>,
    Path((channel, ts)): Path<(String, Timestamp)>,
) -> impl IntoResponse {
    if !state.tracker.finish(&channel, ts) {
        return error_response(
            &format!("no in-flight message at {ts} on {channel}"),
            StatusCode::NOT_FOUND,
        );
    }
    ApiResponse::ok(json!({ "channel": channel, "pending": state.tracker.pending(&channel) }))
        .into_response()
}

// ── Tasks ──────────────────────────────────────────────────────

/// Enqueue a task and wait for it, bounded by the queue's wait timeout.
async fn run_task(state: &ApiState, task: NodeTask) -> Response {
    let timeout = state.tasks.config().wait_timeout;
    let kind = task.kind();
    let handle = match state.tasks.enqueue(task, Some(timeout)) {
        Ok(handle) => handle,
        Err(e) => return task_error(&e),
    };
    match handle.wait_timeout(timeout).await {
        Ok(()) => ApiResponse::ok(json!({ "seq": handle.seq(), "kind": kind })).into_response(),
        Err(e) => {
            if matches!(e, TaskError::DeadlineExceeded(_)) {
                warn!(seq = handle.seq(), %kind, "task still running after wait timeout");
            }
            task_error(&e)
        }
    }
}

/// POST /api/v1/tasks/watch-channels
pub async fn watch_channels(
    State(state): State<ApiState>,
    Json(req): Json<WatchChannelsRequest>,
) -> impl IntoResponse {
    run_task(&state, NodeTask::WatchChannels(req)).await
}

/// POST /api/v1/tasks/load-segments
pub async fn load_segments(
    State(state): State<ApiState>,
    Json(req): Json<LoadSegmentsRequest>,
) -> impl IntoResponse {
    run_task(&state, NodeTask::LoadSegments(req)).await
}

/// POST /api/v1/tasks/release-collection
pub async fn release_collection(
    State(state): State<ApiState>,
    Json(req): Json<ReleaseCollectionRequest>,
) -> impl IntoResponse {
    run_task(&state, NodeTask::ReleaseCollection(req)).await
}

/// POST /api/v1/tasks/release-partitions
pub async fn release_partitions(
    State(state): State<ApiState>,
    Json(req): Json<ReleasePartitionsRequest>,
) -> impl IntoResponse {
    run_task(&state, NodeTask::ReleasePartitions(req)).await
}

/// POST /api/v1/tasks/release-segments
pub async fn release_segments(
    State(state): State<ApiState>,
    Json(req): Json<ReleaseSegmentsRequest>,
) -> impl IntoResponse {
    run_task(&state, NodeTask::ReleaseSegments(req)).await
}

/// POST /api/v1/tasks/add-query-channel
pub async fn add_query_channel(
    State(state): State<ApiState>,
    Json(req): Json<AddQueryChannelRequest>,
) -> impl IntoResponse {
    run_task(&state, NodeTask::AddQueryChannel(req)).await
}

/// POST /api/v1/tasks/remove-query-channel
pub async fn remove_query_channel(
    State(state): State<ApiState>,
    Json(req): Json<RemoveQueryChannelRequest>,
) -> impl IntoResponse {
    run_task(&state, NodeTask::RemoveQueryChannel(req)).await
}

/// GET /api/v1/tasks/metrics
pub async fn task_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.tasks.metrics())
}

/// GET /api/v1/state
pub async fn node_state(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.tasks.state())
}

/// GET /api/v1/health
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let component = state.component_state().await;
    ApiResponse::ok(json!({ "node_id": state.node_id, "state": component }))
}

// ── Segments ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SegmentInfoRequest {
    pub segment_ids: Vec<SegmentId>,
}

/// POST /api/v1/segments/info
pub async fn segment_info(
    State(state): State<ApiState>,
    Json(req): Json<SegmentInfoRequest>,
) -> impl IntoResponse {
    ApiResponse::ok(state.tasks.segment_info(&req.segment_ids))
}

// ── Workers and jobs ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterWorkerRequest {
    pub node_id: NodeId,
    pub address: String,
    /// Dial the worker before registering it.
    #[serde(default)]
    pub verify: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReportLoadRequest {
    pub load: i64,
}

/// GET /api/v1/workers
pub async fn list_workers(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.dispatcher.entries())
}

/// POST /api/v1/workers
pub async fn register_worker(
    State(state): State<ApiState>,
    Json(req): Json<RegisterWorkerRequest>,
) -> impl IntoResponse {
    let address: Address = match req.address.parse() {
        Ok(address) => address,
        Err(e) => return error_response(&e.to_string(), StatusCode::BAD_REQUEST),
    };
    if req.verify {
        if let Err(e) = state.connector.verify(&req.address).await {
            return dispatch_error(&e);
        }
    }

    let info = WorkerInfo::new(req.node_id, address.clone());
    match state.dispatcher.register(req.node_id, address, info.clone()) {
        Ok(()) => (StatusCode::CREATED, ApiResponse::ok(info)).into_response(),
        Err(e) => dispatch_error(&e),
    }
}

/// DELETE /api/v1/workers/{id}
pub async fn deregister_worker(
    State(state): State<ApiState>,
    Path(id): Path<NodeId>,
) -> impl IntoResponse {
    match state.dispatcher.deregister(id) {
        Ok(entry) => ApiResponse::ok(entry.handle).into_response(),
        Err(e) => dispatch_error(&e),
    }
}

/// PUT /api/v1/workers/{id}/load
pub async fn report_load(
    State(state): State<ApiState>,
    Path(id): Path<NodeId>,
    Json(req): Json<ReportLoadRequest>,
) -> impl IntoResponse {
    match state.dispatcher.report_load(id, req.load) {
        Ok(()) => ApiResponse::ok(json!({ "node_id": id, "load": req.load })).into_response(),
        Err(e) => dispatch_error(&e),
    }
}

/// POST /api/v1/jobs
pub async fn assign_job(State(state): State<ApiState>) -> impl IntoResponse {
    match state.dispatcher.assign() {
        Ok(assignment) => ApiResponse::ok(assignment).into_response(),
        Err(e) => dispatch_error(&e),
    }
}

/// POST /api/v1/jobs/{worker}/complete
pub async fn complete_job(
    State(state): State<ApiState>,
    Path(worker): Path<NodeId>,
) -> impl IntoResponse {
    match state.dispatcher.complete(worker) {
        Ok(load) => ApiResponse::ok(json!({ "node_id": worker, "load": load })).into_response(),
        Err(e) => dispatch_error(&e),
    }
}
