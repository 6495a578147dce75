//! REST API handlers.
//!
//! Every handler forwards to the running controller through its
//! `ControllerHandle` and wraps the answer in `ApiResponse`.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::warn;

use dbscale_engine::ControlError;

use crate::ApiState;

/// Events and snapshots returned per cluster unless `?limit=` says otherwise.
const DEFAULT_LIMIT: usize = 10;

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

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn control_error(e: ControlError) -> axum::response::Response {
    let status = match &e {
        ControlError::UnknownCluster(_) => StatusCode::NOT_FOUND,
        ControlError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
        ControlError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status.is_server_error() {
        warn!(error = %e, "controller unavailable");
    }
    error_response(&e.to_string(), status).into_response()
}

fn respond<T: serde::Serialize>(result: Result<T, ControlError>) -> axum::response::Response {
    match result {
        Ok(data) => ApiResponse::ok(data).into_response(),
        Err(e) => control_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

// ── Clusters ───────────────────────────────────────────────────

/// GET /api/v1/clusters
pub async fn list_clusters(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    respond(state.handle.status(None, limit).await)
}

/// GET /api/v1/clusters/:id
pub async fn get_cluster(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    respond(
        state
            .handle
            .status(Some(&id), limit)
            .await
            .and_then(|mut list| list.pop().ok_or(ControlError::UnknownCluster(id))),
    )
}

/// POST /api/v1/clusters/:id/enable
pub async fn enable_cluster(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    respond(state.handle.set_enabled(&id, true).await)
}

/// POST /api/v1/clusters/:id/disable
pub async fn disable_cluster(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    respond(state.handle.set_enabled(&id, false).await)
}

// ── Scaling ────────────────────────────────────────────────────

/// Forced resize request body.
#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    pub target_size: String,
}

/// POST /api/v1/clusters/:id/scale
pub async fn scale_cluster(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ScaleRequest>,
) -> impl IntoResponse {
    match state.handle.force_scale(&id, &req.target_size).await {
        Ok(event) if event.is_success() => ApiResponse::ok(event).into_response(),
        // The attempt happened and was recorded; report it with the failure.
        Ok(event) => (
            StatusCode::BAD_GATEWAY,
            Json(ApiResponse {
                success: false,
                error: event.error.as_ref().map(|e| e.detail.clone()),
                data: Some(event),
            }),
        )
            .into_response(),
        Err(e) => control_error(e),
    }
}

/// POST /api/v1/clusters/:id/check
pub async fn check_cluster(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    respond(state.handle.run_once(Some(&id)).await)
}

/// POST /api/v1/check
pub async fn check_all(State(state): State<ApiState>) -> impl IntoResponse {
    respond(state.handle.run_once(None).await)
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let statuses = match state.handle.status(None, 1).await {
        Ok(statuses) => statuses,
        Err(e) => return control_error(e),
    };

    let body = dbscale_metrics::render_prometheus(&statuses);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}
