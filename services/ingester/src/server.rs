//! HTTP server for the ingester service.
//!
//! Provides endpoints for:
//! - `POST /ipfs/:hash` - Ingest a telemetry object
//! - `GET /ipfs/:hash` - Raw object bytes
//! - `GET /weather/:geohash/latest` - Latest reading for a geohash
//! - `POST /chainlink` - Chainlink external adapter
//! - `POST /ipns` - Republish the root now
//! - `GET /status` - Active/recent ingestions and publish queue counters
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics

use axum::{
    body::Bytes,
    extract::{Extension, Path},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::info;
use uuid::Uuid;

use ingestion::{with_deadline, IngestOutcome, IngestionPipeline, WeatherQuery};
use storage::{PublishJob, PublishQueue, QueueStats, SubmitOutcome};
use weather_common::WeatherError;

use crate::chainlink::AdapterRequest;
use crate::error::{ApiError, RequestLine};
use crate::tracker::{IngestionTracker, TrackerStatus};

/// Shared state for the HTTP server.
pub struct ServerState {
    pub pipeline: IngestionPipeline,
    pub query: WeatherQuery,
    pub queue: PublishQueue,
    /// Tracking for active/completed ingestions
    pub tracker: IngestionTracker,
    /// Deadline for queries
    pub request_timeout: Duration,
    /// Installed Prometheus recorder, if any
    pub prometheus: Option<PrometheusHandle>,
}

impl ServerState {
    pub fn new(
        pipeline: IngestionPipeline,
        query: WeatherQuery,
        queue: PublishQueue,
        request_timeout: Duration,
    ) -> Self {
        Self {
            pipeline,
            query,
            queue,
            tracker: IngestionTracker::new(),
            request_timeout,
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

/// Response body for `POST /ipfs/:hash`.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub id: String,
    #[serde(flatten)]
    pub outcome: IngestOutcome,
}

/// Response body for `POST /ipns`.
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub job_id: Uuid,
    pub outcome: SubmitOutcome,
}

/// Response for `/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub ingestions: TrackerStatus,
    pub publish: QueueStats,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// POST /ipfs/:hash - Ingest a telemetry object
async fn ingest_handler(
    Extension(state): Extension<Arc<ServerState>>,
    request: RequestLine,
    Path(hash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = Uuid::new_v4().to_string();
    info!(id = %id, hash = %hash, "Received ingest request");

    // Runs to completion and settles the tracker entry even if the client
    // disconnects and this handler is dropped.
    let task = {
        let state = state.clone();
        let id = id.clone();
        tokio::spawn(async move {
            state.tracker.start(&id, &hash).await;
            let result = state.pipeline.ingest(&hash).await;
            state.tracker.complete(&id, &result).await;
            result
        })
    };

    let outcome = task
        .await
        .map_err(|e| WeatherError::Internal(format!("ingest task failed: {}", e)))
        .and_then(|result| result)
        .map_err(|e| request.fail(e))?;
    Ok((StatusCode::ACCEPTED, Json(IngestResponse { id, outcome })))
}

/// GET /ipfs/:hash - Raw object bytes
async fn object_handler(
    Extension(state): Extension<Arc<ServerState>>,
    request: RequestLine,
    Path(hash): Path<String>,
) -> Result<Response, ApiError> {
    let query = state.query.clone();
    let bytes = with_deadline(state.request_timeout, async move { query.object(&hash).await })
        .await
        .map_err(|e| request.fail(e))?;

    let content_type = if serde_json::from_slice::<serde::de::IgnoredAny>(&bytes).is_ok() {
        "application/json"
    } else {
        "application/octet-stream"
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// GET /weather/:geohash/latest - Latest reading
async fn latest_handler(
    Extension(state): Extension<Arc<ServerState>>,
    request: RequestLine,
    Path(geohash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    info!(geohash = %geohash, "Getting latest reading");

    let query = state.query.clone();
    let reading = with_deadline(state.request_timeout, async move { query.latest(&geohash).await })
        .await
        .map_err(|e| request.fail(e))?;
    Ok(Json(reading))
}

/// POST /chainlink - Chainlink external adapter
async fn chainlink_handler(
    Extension(state): Extension<Arc<ServerState>>,
    request: RequestLine,
    body: Bytes,
) -> Result<Response, ApiError> {
    let adapter = AdapterRequest::parse(&body, &request)?;
    info!(job_run_id = %adapter.job_run_id, "Received adapter request");

    let geohash = match adapter.geohash() {
        Ok(geohash) => geohash,
        Err(e) => return Ok(adapter.failure(&e)),
    };

    let query = state.query.clone();
    match with_deadline(state.request_timeout, async move { query.latest(&geohash).await }).await {
        Ok(reading) => Ok(adapter.success(reading)),
        Err(e) => Ok(adapter.failure(&e)),
    }
}

/// POST /ipns - Republish the root folder
async fn publish_handler(
    Extension(state): Extension<Arc<ServerState>>,
    request: RequestLine,
) -> Result<impl IntoResponse, ApiError> {
    let job = PublishJob::new("manual");
    let job_id = job.id;

    match state.queue.submit(job) {
        SubmitOutcome::Closed => Err(request.fail(WeatherError::Internal(
            "publish queue is shut down".to_string(),
        ))),
        outcome => Ok((StatusCode::ACCEPTED, Json(PublishResponse { job_id, outcome }))),
    }
}

/// GET /status - Ingestion and publish status
async fn status_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    Json(StatusResponse {
        ingestions: state.tracker.get_status().await,
        publish: state.queue.stats(),
    })
}

/// GET /health - Health check
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "ingester".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /metrics - Prometheus metrics
async fn metrics_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    let body = state
        .prometheus
        .as_ref()
        .map(PrometheusHandle::render)
        .unwrap_or_default();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

async fn not_found_handler(request: RequestLine) -> ApiError {
    ApiError::not_found(&request)
}

/// Build the HTTP router.
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/ipfs/:hash", post(ingest_handler).get(object_handler))
        .route("/weather/:geohash/latest", get(latest_handler))
        .route("/chainlink", post(chainlink_handler))
        .route("/ipns", post(publish_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found_handler)
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_DNS_PREFETCH_CONTROL,
            HeaderValue::from_static("off"),
        ))
}

/// Start the HTTP server and serve until `shutdown` resolves.
pub async fn start_server<F>(
    state: Arc<ServerState>,
    addr: SocketAddr,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);

    info!(addr = %addr, "Starting ingester HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
