//! Standalone API tests.
//!
//! Assembles the node the way `tidewaterd standalone` does and drives the
//! router in-process: watermarks, control tasks and job dispatch.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use tide_core::NodeConfig;
use tidewater_api::{ApiState, build_router};

async fn test_node() -> (ApiState, Router) {
    let mut config = NodeConfig::default();
    config.ticker.channels = vec!["by-dev-dml_0".into(), "by-dev-dml_1".into()];
    config.ticker.interval = "20ms".into();
    config.tasks.wait_timeout = "5s".into();

    let state = ApiState::from_config(&config).unwrap();
    state.start().await.unwrap();
    let router = build_router(state.clone());
    (state, router)
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn segment(segment_id: i64, partition_id: i64) -> Value {
    json!({
        "segment_id": segment_id,
        "collection_id": 100,
        "partition_id": partition_id,
        "num_rows": 2048,
        "mem_size": 1 << 20,
    })
}

#[tokio::test]
async fn watermarks_advance_for_startup_channels() {
    let (state, router) = test_node().await;

    let (status, body) = send(&router, "GET", "/api/v1/watermarks/by-dev-dml_0", None).await;
    assert_eq!(status, StatusCode::OK);
    let first = body["data"]["watermark"].as_u64().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let (_, body) = send(&router, "GET", "/api/v1/watermarks/by-dev-dml_0", None).await;
    let later = body["data"]["watermark"].as_u64().unwrap();
    assert!(later >= first);

    let (status, body) = send(&router, "GET", "/api/v1/watermarks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["success"].as_bool().unwrap());

    state.shutdown().await;
}

#[tokio::test]
async fn pending_message_holds_watermark_back() {
    let (state, router) = test_node().await;
    let watermark = |body: Value| body["data"]["watermark"].as_u64().unwrap();

    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/channels/by-dev-dml_1/inflight",
        Some(json!({ "ts": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pending"], 1);

    state.ticker.tick().await.unwrap();
    let (_, body) = send(&router, "GET", "/api/v1/watermarks/by-dev-dml_1", None).await;
    let held = watermark(body);

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let (_, body) = send(&router, "GET", "/api/v1/watermarks/by-dev-dml_1", None).await;
    assert_eq!(watermark(body), held);

    let (status, body) = send(&router, "DELETE", "/api/v1/channels/by-dev-dml_1/inflight/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pending"], 0);

    state.ticker.tick().await.unwrap();
    let (_, body) = send(&router, "GET", "/api/v1/watermarks/by-dev-dml_1", None).await;
    assert!(watermark(body) > held);

    let (status, _) = send(&router, "DELETE", "/api/v1/channels/by-dev-dml_1/inflight/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    state.shutdown().await;
}

#[tokio::test]
async fn channel_add_and_remove() {
    let (state, router) = test_node().await;

    let (status, _) = send(
        &router,
        "POST",
        "/api/v1/channels",
        Some(json!({ "channel": "by-dev-dml_2" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = send(&router, "GET", "/api/v1/channels", None).await;
    assert_eq!(
        body["data"],
        json!(["by-dev-dml_0", "by-dev-dml_1", "by-dev-dml_2"])
    );

    let (status, _) = send(&router, "DELETE", "/api/v1/channels/by-dev-dml_2", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, "GET", "/api/v1/watermarks/by-dev-dml_2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    state.shutdown().await;
}

#[tokio::test]
async fn control_tasks_apply_in_order() {
    let (state, router) = test_node().await;

    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/tasks/watch-channels",
        Some(json!({ "collection_id": 100, "channels": ["by-dev-dml_0_100v0"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["kind"], "watch_channels");
    let watch_seq = body["data"]["seq"].as_u64().unwrap();

    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/tasks/load-segments",
        Some(json!({ "collection_id": 100, "segments": [segment(1, 10), segment(2, 11)] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["seq"].as_u64().unwrap() > watch_seq);

    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/segments/info",
        Some(json!({ "segment_ids": [1, 2, 99] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, _) = send(
        &router,
        "POST",
        "/api/v1/tasks/release-partitions",
        Some(json!({ "collection_id": 100, "partition_ids": [11] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&router, "GET", "/api/v1/state", None).await;
    assert_eq!(body["data"]["loaded_mem_bytes"], 1 << 20);

    let (status, _) = send(
        &router,
        "POST",
        "/api/v1/tasks/release-collection",
        Some(json!({ "collection_id": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &router,
        "POST",
        "/api/v1/tasks/release-collection",
        Some(json!({ "collection_id": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&router, "GET", "/api/v1/tasks/metrics", None).await;
    assert_eq!(body["data"]["succeeded"], 4);
    assert_eq!(body["data"]["failed"], 1);

    state.shutdown().await;
}

#[tokio::test]
async fn query_channels_follow_collection() {
    let (state, router) = test_node().await;
    let pair = json!({
        "collection_id": 100,
        "request_channel": "by-dev-search",
        "result_channel": "by-dev-searchResult",
    });

    let (status, body) = send(&router, "POST", "/api/v1/tasks/add-query-channel", Some(pair.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["kind"], "add_query_channel");

    let (status, _) = send(&router, "POST", "/api/v1/tasks/add-query-channel", Some(pair.clone())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&router, "POST", "/api/v1/tasks/remove-query-channel", Some(pair.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, "POST", "/api/v1/tasks/remove-query-channel", Some(pair)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    state.shutdown().await;
}

#[tokio::test]
async fn health_tracks_lifecycle() {
    let (state, router) = test_node().await;

    let (status, body) = send(&router, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "healthy");

    state.shutdown().await;

    let (status, body) = send(&router, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "stopping");
}

#[tokio::test]
async fn invalid_task_is_rejected() {
    let (state, router) = test_node().await;

    let (status, body) = send(
        &router,
        "POST",
        "/api/v1/tasks/watch-channels",
        Some(json!({ "collection_id": 100, "channels": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body["success"].as_bool().unwrap());
    assert!(body["error"].is_string());

    state.shutdown().await;
}

#[tokio::test]
async fn jobs_go_to_least_loaded_worker() {
    let (state, router) = test_node().await;

    for (id, port) in [(1, 21121), (2, 21122), (3, 21123)] {
        let (status, _) = send(
            &router,
            "POST",
            "/api/v1/workers",
            Some(json!({ "node_id": id, "address": format!("10.0.0.{id}:{port}") })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    for (id, load) in [(1, 5), (2, 1), (3, 3)] {
        let (status, _) = send(
            &router,
            "PUT",
            &format!("/api/v1/workers/{id}/load"),
            Some(json!({ "load": load })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(&router, "POST", "/api/v1/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["node_id"], 2);

    let (status, _) = send(
        &router,
        "PUT",
        "/api/v1/workers/2/load",
        Some(json!({ "load": 11 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&router, "POST", "/api/v1/jobs", None).await;
    assert_eq!(body["data"]["node_id"], 3);

    let (status, body) = send(&router, "POST", "/api/v1/jobs/3/complete", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["load"], 3);

    let (status, _) = send(&router, "DELETE", "/api/v1/workers/3", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&router, "GET", "/api/v1/workers", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    state.shutdown().await;
}

#[tokio::test]
async fn duplicate_worker_address_conflicts() {
    let (state, router) = test_node().await;

    let worker = |id: i64| json!({ "node_id": id, "address": "10.0.0.1:21121" });
    let (status, _) = send(&router, "POST", "/api/v1/workers", Some(worker(1))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&router, "POST", "/api/v1/workers", Some(worker(2))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    state.shutdown().await;
}
