//! Error taxonomy shared across the identity/policy/memory control plane.
//!
//! Components return `AppError` from every fallible operation; the HTTP
//! boundary (see `identity_service_api`) is the single place that maps a
//! kind to a status code and response body. Nothing below this boundary
//! should construct an `axum` response directly.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("access denied for {action} on {resource}")]
    AccessDenied { action: String, resource: String },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited")]
    RateLimited { limit: u64, remaining: u64, reset_at: i64 },

    /// Store/cache/egress hiccup. The HTTP boundary retries locally up to a
    /// small bound before surfacing 503; internal detail is never leaked.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Raised only when *writing* a policy; evaluation-time malformed rules
    /// are treated as non-matching and never produce this variant.
    #[error("policy malformed: {0}")]
    PolicyMalformed(String),

    #[error("internal error")]
    Internal(String),
}

impl AppError {
    fn parts(&self) -> (StatusCode, String, &'static str) {
        match self {
            AppError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "unauthenticated".to_string(), "UNAUTHENTICATED")
            },
            AppError::AccessDenied { action, resource } => (
                StatusCode::FORBIDDEN,
                format!("access denied for {action} on {resource}"),
                "ACCESS_DENIED",
            ),
            AppError::ValidationFailed(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg.clone(), "VALIDATION_FAILED")
            },
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), "NOT_FOUND"),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), "CONFLICT"),
            AppError::RateLimited { .. } => {
                (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded".to_string(), "RATE_LIMITED")
            },
            AppError::Transient(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service temporarily unavailable".to_string(),
                "TRANSIENT",
            ),
            AppError::PolicyMalformed(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone(), "POLICY_MALFORMED")
            },
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
                "INTERNAL",
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, AppError::Internal(_) | AppError::Transient(_)) {
            tracing::error!(error = %self, "request failed");
        }

        let (status, details, code) = self.parts();
        let mut response = (
            status,
            Json(json!({
                "error": code,
                "details": details,
            })),
        )
            .into_response();

        if let AppError::RateLimited { limit, remaining, reset_at } = self {
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", limit.into());
            headers.insert("X-RateLimit-Remaining", remaining.into());
            headers.insert("X-RateLimit-Reset", reset_at.into());
            headers.insert("Retry-After", (reset_at - chrono_now()).max(0).into());
        }

        response
    }
}

fn chrono_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("row not found".to_string()),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict("unique constraint violated".to_string())
            },
            other => AppError::Transient(other.to_string()),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        AppError::Unauthenticated
    }
}

impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::Transient(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Transient(err.to_string())
    }
}

impl From<std::env::VarError> for AppError {
    fn from(err: std::env::VarError) -> Self {
        AppError::Internal(format!("configuration error: {err}"))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationFailed(err.to_string())
    }
}
