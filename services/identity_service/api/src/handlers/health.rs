//! `GET /healthz` (§6, ambient — not part of the versioned `/v1` surface).

use axum::{extract::State, http::StatusCode, response::Response, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_error::AppError;

use crate::state::AppState;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResp {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub database: String,
}

#[utoipa::path(
    get,
    path = "/healthz",
    tag = "health",
    operation_id = "health_check",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResp),
        (status = 503, description = "Service is degraded", body = HealthResp),
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Result<Response, AppError> {
    use axum::response::IntoResponse;

    let database = match shared_db::check_connection(&state.pool).await {
        Ok(()) => "healthy".to_string(),
        Err(e) => {
            tracing::error!(%e, "database health check failed");
            "unhealthy".to_string()
        }
    };

    let status = if database == "healthy" { "ok" } else { "degraded" };
    let resp = HealthResp { status: status.to_string(), version: env!("CARGO_PKG_VERSION").to_string(), timestamp: Utc::now(), database };

    if status == "degraded" {
        Ok((StatusCode::SERVICE_UNAVAILABLE, Json(resp)).into_response())
    } else {
        Ok((StatusCode::OK, Json(resp)).into_response())
    }
}

#[utoipa::path(
    get,
    path = "/metrics",
    tag = "health",
    operation_id = "metrics",
    responses((status = 200, description = "Prometheus text exposition", content_type = "text/plain")),
)]
pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    use axum::response::IntoResponse;

    match state.metrics.render() {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!(%e, "failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}

pub fn routes() -> axum::Router<AppState> {
    axum::Router::new().route("/healthz", axum::routing::get(health_check)).route("/metrics", axum::routing::get(metrics_endpoint))
}
