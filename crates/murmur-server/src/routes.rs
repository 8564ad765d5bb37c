use axum::{
    Json, Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use murmur_jobs::{JobQueue, RemovalJob};
use murmur_streaming::Hub;
use murmur_streaming::connection::{self, is_streamable_channel};
use murmur_types::api::{RemovalAccepted, RemovalRequest, RemoveOptions};

#[derive(Clone)]
pub struct AppState {
    pub queue: JobQueue,
    pub hub: Hub,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/internal/removals", post(enqueue_removal))
        .route("/internal/removals/dead", get(dead_removals))
        .route("/internal/removals/dead/{job_id}/retry", post(retry_removal))
        .route("/streaming", get(streaming))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn enqueue_removal(
    State(state): State<AppState>,
    Json(req): Json<RemovalRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if let Err(reason) = RemoveOptions::from_value(&req.options) {
        warn!("Rejected removal of status {}: {}", req.status_id, reason);
        return Err((StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": reason }))));
    }

    let job = RemovalJob {
        status_id: req.status_id,
        options: req.options,
    };
    let job_id = state.queue.enqueue(job).await.map_err(|e| {
        error!("Failed to enqueue removal of status {}: {:#}", req.status_id, e);
        internal_error()
    })?;

    Ok((StatusCode::ACCEPTED, Json(RemovalAccepted { job_id })))
}

async fn dead_removals(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let jobs = state.queue.dead_jobs().await.map_err(|e| {
        error!("Failed to list dead removal jobs: {:#}", e);
        internal_error()
    })?;
    Ok(Json(jobs))
}

async fn retry_removal(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let revived = state.queue.retry_dead(job_id).await.map_err(|e| {
        error!("Failed to retry removal job {}: {:#}", job_id, e);
        internal_error()
    })?;

    if !revived {
        return Err((StatusCode::NOT_FOUND, Json(json!({ "error": "no such dead job" }))));
    }

    info!("Removal job {} requeued by operator", job_id);
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    channel: String,
}

async fn streaming(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    if !is_streamable_channel(&query.channel) {
        return Err(StatusCode::BAD_REQUEST);
    }

    Ok(ws.on_upgrade(move |socket| connection::handle_subscription(socket, state.hub, query.channel)))
}

fn internal_error() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
}
