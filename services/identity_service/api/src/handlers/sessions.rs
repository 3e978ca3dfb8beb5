//! `POST /sessions/refresh`, `GET/DELETE /sessions`, `DELETE /sessions/{id}` (§6).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use identity_service_core::dto::{RefreshReq, SessionResp, SessionTokenResp};
use identity_service_core::model::Session;
use serde_json::json;
use shared_error::AppError;
use validator::Validate;

use crate::extractors::{ClientInfo, CurrentPrincipal};
use crate::handlers::common::record_mutation;
use crate::state::AppState;

fn to_resp(session: &Session) -> SessionResp {
    SessionResp {
        id: session.id,
        identity_id: session.identity_id,
        ip: session.ip.clone(),
        user_agent: session.user_agent.clone(),
        is_active: session.is_active,
        expires_at: session.expires_at,
        last_used_at: session.last_used_at,
        created_at: session.created_at,
    }
}

#[utoipa::path(
    post,
    path = "/v1/sessions/refresh",
    tag = "sessions",
    operation_id = "refresh_session",
    request_body = RefreshReq,
    responses(
        (status = 200, description = "New access token issued", body = SessionTokenResp),
        (status = 401, description = "Refresh token invalid, revoked or expired", body = identity_service_core::dto::ErrorResp),
    )
)]
pub async fn refresh(State(state): State<AppState>, Json(payload): Json<RefreshReq>) -> Result<Json<SessionTokenResp>, AppError> {
    payload.validate()?;
    let refreshed = state.infra.session_service.refresh(&payload.refresh_token).await?;
    Ok(Json(SessionTokenResp {
        access_token: refreshed.access_token,
        refresh_token: refreshed.refresh_token,
        expires_in: refreshed.expires_in,
    }))
}

#[utoipa::path(
    get,
    path = "/v1/sessions",
    tag = "sessions",
    operation_id = "list_sessions",
    responses((status = 200, description = "Active and past sessions for the caller", body = [SessionResp])),
    security(("bearer_auth" = []))
)]
pub async fn list_sessions(State(state): State<AppState>, CurrentPrincipal(principal): CurrentPrincipal) -> Result<Json<Vec<SessionResp>>, AppError> {
    let sessions = state.infra.sessions.list_for_identity(principal.scope, principal.identity_id).await?;
    Ok(Json(sessions.iter().map(to_resp).collect()))
}

#[utoipa::path(
    delete,
    path = "/v1/sessions",
    tag = "sessions",
    operation_id = "revoke_all_sessions",
    responses((status = 204, description = "All sessions revoked")),
    security(("bearer_auth" = []))
)]
pub async fn revoke_all_sessions(State(state): State<AppState>, CurrentPrincipal(principal): CurrentPrincipal, client: ClientInfo) -> Result<StatusCode, AppError> {
    let count = state.infra.session_service.revoke_all(principal.scope, principal.identity_id, None).await?;
    record_mutation(
        &state,
        principal.scope,
        &principal,
        "session.revoked",
        Some(principal.identity_id),
        "session",
        None,
        Some(json!({"revoked_count": count})),
        &client,
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/v1/sessions/{id}",
    tag = "sessions",
    operation_id = "revoke_session",
    params(("id" = uuid::Uuid, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 404, description = "Not found", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn revoke_session(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<uuid::Uuid>,
    client: ClientInfo,
) -> Result<StatusCode, AppError> {
    state
        .infra
        .sessions
        .find_by_id(principal.scope, id)
        .await?
        .ok_or_else(|| AppError::NotFound("session not found".to_string()))?;
    state.infra.session_service.revoke(principal.scope, id).await?;
    record_mutation(&state, principal.scope, &principal, "session.revoked", Some(id), "session", None, None, &client).await;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sessions/refresh", post(refresh))
        .route("/sessions", get(list_sessions).delete(revoke_all_sessions))
        .route("/sessions/{id}", axum::routing::delete(revoke_session))
}
