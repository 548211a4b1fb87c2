//! HTTP surface over the typed core operations.
//!
//! Thin glue only: handlers translate wire JSON to queue/pool calls and map
//! the error taxonomy to status codes. No scheduling logic lives here.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::Error;
use crate::scheduler::job::{Job, JobStatus};
use crate::scheduler::pool::DeviceSnapshot;
use crate::scheduler::{Queue, QueueStats, ResourcePool, SubmitRequest};

#[derive(Clone)]
pub struct ApiState {
    pub queue: Queue,
    pub pool: Arc<RwLock<ResourcePool>>,
}

/// Error taxonomy → HTTP status mapping.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidState(_) => StatusCode::CONFLICT,
            Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

#[derive(Deserialize)]
pub struct ListParams {
    pub org_id: String,
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub org_id: String,
    pub status_filter: Option<String>,
    pub count: usize,
    pub jobs: Vec<Job>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub queue: QueueStats,
    pub scheduler: SchedulerStats,
}

#[derive(Serialize)]
pub struct SchedulerStats {
    pub agents: usize,
    pub devices: usize,
    pub running_jobs: usize,
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/api/jobs", post(submit_handler).get(list_jobs_handler))
        .route("/api/jobs/:job_id", get(get_job_handler))
        .route("/api/jobs/:job_id/cancel", post(cancel_handler))
        .route("/api/jobs/:job_id/retry", post(retry_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/groups", get(groups_handler))
        .route("/api/devices", get(devices_handler))
        .layer(cors)
        .with_state(state)
}

/// Serve the API until the token is cancelled.
pub async fn serve(
    addr: SocketAddr,
    state: ApiState,
    shutdown: CancellationToken,
) -> crate::error::Result<()> {
    let app = router(state);
    tracing::info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("bind {addr}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::Internal(format!("server: {e}")))
}

pub async fn index_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "fleetrun",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn submit_handler(
    State(state): State<ApiState>,
    Json(payload): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipt = state.queue.submit(payload).await?;
    Ok(Json(receipt))
}

pub async fn get_job_handler(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.queue.get(&job_id).await?))
}

pub async fn list_jobs_handler(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, ApiError> {
    let status = params
        .status
        .as_deref()
        .map(|s| s.parse::<JobStatus>())
        .transpose()
        .map_err(Error::Validation)?;
    let jobs = state.queue.list(&params.org_id, status).await?;
    Ok(Json(ListResponse {
        org_id: params.org_id,
        status_filter: params.status,
        count: jobs.len(),
        jobs,
    }))
}

pub async fn cancel_handler(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.queue.cancel(&job_id).await?))
}

pub async fn retry_handler(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.queue.retry(&job_id).await?))
}

pub async fn stats_handler(
    State(state): State<ApiState>,
) -> Result<Json<StatsResponse>, ApiError> {
    let queue = state.queue.stats().await?;
    let pool = state.pool.read().await;
    Ok(Json(StatsResponse {
        queue,
        scheduler: SchedulerStats {
            agents: pool.agent_count(),
            devices: pool.device_count(),
            running_jobs: pool.bound_job_count(),
        },
    }))
}

pub async fn groups_handler(
    State(state): State<ApiState>,
) -> Result<Json<Vec<crate::scheduler::GroupSummary>>, ApiError> {
    Ok(Json(state.queue.groups().await?))
}

pub async fn devices_handler(State(state): State<ApiState>) -> Json<Vec<DeviceSnapshot>> {
    Json(state.pool.read().await.devices())
}
