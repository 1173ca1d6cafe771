//! Tests for the ingester HTTP server.
//!
//! The router runs against the in-memory store, so every route is exercised
//! end to end without an IPFS node.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use ingester::server::{build_router, ServerState};
use ingestion::{IngestionPipeline, PipelineConfig, WeatherQuery};
use storage::{ContentStore, PublishQueue, PublishQueueConfig};
use test_utils::{fixtures, MemoryStore, StoreOp};

fn app(store: MemoryStore) -> (Router, Arc<MemoryStore>, PublishQueue) {
    let store = Arc::new(store);
    let dyn_store: Arc<dyn ContentStore> = store.clone();

    let queue = PublishQueue::start(dyn_store.clone(), PublishQueueConfig::default());
    let pipeline = IngestionPipeline::new(
        dyn_store.clone(),
        queue.clone(),
        PipelineConfig::default(),
    );
    let query = WeatherQuery::new(dyn_store, fixtures::ROOT);
    let state = ServerState::new(pipeline, query, queue.clone(), Duration::from_secs(5));

    (build_router(Arc::new(state)), store, queue)
}

fn sample_store() -> MemoryStore {
    MemoryStore::new().with_object(
        &fixtures::hash(1),
        fixtures::object_bytes(&fixtures::sample_telemetry()),
    )
}

async fn send(app: &Router, method: Method, uri: &str, body: Body) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, Body::empty()).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Body::from(body.to_string())).await
}

#[tokio::test]
async fn test_ingest_then_latest() {
    let (app, store, _queue) = app(sample_store());

    let (status, body) = post(&app, &format!("/ipfs/{}", fixtures::hash(1)), Value::Null).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["geohash"], "u4pr");
    assert_eq!(body["record_path"], "/weather/u4pr/20240101_000000000.json");
    assert_eq!(body["publish"], "queued");
    assert!(body["id"].is_string());
    assert!(store.file("/weather/u4pr/latest.json").is_some());

    let (status, body) = get(&app, "/weather/u4pr/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "date": "2024-01-01T00:00:00.000Z",
            "geohash": "u4pr",
            "temperature": 21.4
        })
    );
}

#[tokio::test]
async fn test_short_hash_rejected() {
    let (app, store, _queue) = app(MemoryStore::new());
    let short = fixtures::short_hash();

    let (status, body) = post(&app, &format!("/ipfs/{}", short), Value::Null).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("46"));
    assert_eq!(body["message"], format!("Could not POST /ipfs/{}", short));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_non_telemetry_rejected() {
    let (app, _store, _queue) = app(MemoryStore::new().with_object(&fixtures::hash(1), "[]"));

    let (status, body) = post(&app, &format!("/ipfs/{}", fixtures::hash(1)), Value::Null).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("empty array"));
}

#[tokio::test]
async fn test_unknown_geohash_is_404() {
    let (app, _store, _queue) = app(MemoryStore::new());

    let (status, body) = get(&app, "/weather/u4pr/latest").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Could not GET /weather/u4pr/latest");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _store, _queue) = app(MemoryStore::new());

    let (status, body) = get(&app, "/nope").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Not found", "message": "Could not GET /nope" }));
}

#[tokio::test]
async fn test_object_served_raw() {
    let (app, _store, _queue) = app(sample_store());

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/ipfs/{}", fixtures::hash(1)))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes, fixtures::object_bytes(&fixtures::sample_telemetry()));
}

#[tokio::test]
async fn test_chainlink_success() {
    let (app, _store, _queue) = app(sample_store());
    post(&app, &format!("/ipfs/{}", fixtures::hash(1)), Value::Null).await;

    let (status, body) = post(
        &app,
        "/chainlink",
        json!({ "id": "job-1", "data": { "geohash": "u4pr" } }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jobRunID"], "job-1");
    assert_eq!(body["statusCode"], 200);
    assert_eq!(body["data"]["temperature"], 21.4);
}

#[tokio::test]
async fn test_chainlink_errors() {
    let (app, _store, _queue) = app(MemoryStore::new());

    let (status, body) = post(&app, "/chainlink", json!({ "data": { "geohash": "u4pr" } })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Required parameter 'id' is missing");
    assert_eq!(body["message"], "Could not POST /chainlink");

    let (status, body) = post(&app, "/chainlink", json!({ "id": 1, "data": {} })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["jobRunID"], 1);
    assert_eq!(body["status"], "errored");
    assert_eq!(body["error"]["name"], "InvalidInputError");

    let (status, body) = post(&app, "/chainlink", json!({ "id": 1, "data": { "geohash": "u4pr" } })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["statusCode"], 404);
    assert_eq!(body["error"]["name"], "NotFoundError");
}

#[tokio::test]
async fn test_manual_publish() {
    let (app, store, queue) = app(MemoryStore::new());
    store.mkdir("/weather").await.unwrap();

    let (status, body) = post(&app, "/ipns", Value::Null).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["outcome"], "queued");

    queue.shutdown().await;
    assert_eq!(store.published().len(), 1);

    let (status, body) = post(&app, "/ipns", Value::Null).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Could not POST /ipns");
}

#[tokio::test]
async fn test_status_reports_ingestions() {
    let (app, _store, _queue) = app(sample_store());
    post(&app, &format!("/ipfs/{}", fixtures::hash(1)), Value::Null).await;
    post(&app, &format!("/ipfs/{}", fixtures::short_hash()), Value::Null).await;

    let (status, body) = get(&app, "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ingestions"]["total_completed"], 2);
    assert_eq!(body["ingestions"]["recent"][0]["success"], false);
    assert_eq!(body["ingestions"]["recent"][1]["geohash"], "u4pr");
    assert_eq!(body["publish"]["concurrency"], 3);
}

#[tokio::test]
async fn test_abandoned_ingest_still_completes_tracking() {
    let store = sample_store();
    store.set_delay(StoreOp::Cat, Duration::from_millis(100));
    let (app, store, _queue) = app(store);

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/ipfs/{}", fixtures::hash(1)))
        .body(Body::empty())
        .unwrap();
    // The client gives up while the object is still being fetched.
    let abandoned = tokio::time::timeout(Duration::from_millis(20), app.clone().oneshot(request)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(500)).await;

    let (status, body) = get(&app, "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ingestions"]["active"], json!([]));
    assert_eq!(body["ingestions"]["total_completed"], 1);
    assert_eq!(body["ingestions"]["recent"][0]["success"], true);
    assert!(store.file("/weather/u4pr/latest.json").is_some());
}

#[tokio::test]
async fn test_health_and_security_headers() {
    let (app, _store, _queue) = app(MemoryStore::new());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "SAMEORIGIN");
    assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    assert_eq!(headers.get("x-dns-prefetch-control").unwrap(), "off");

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "ingester");
}
