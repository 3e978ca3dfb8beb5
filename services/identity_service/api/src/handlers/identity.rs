//! `POST /identity`, `GET /identity/me`, `GET/PUT/DELETE /identity/{id}` (§6).

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use identity_service_core::dto::{IdentityResp, IdentityWithTokenResp, UpdateIdentityReq, UpsertIdentityReq};
use identity_service_core::model::Identity;
use identity_service_core::policy_eval::EvalContext;
use serde_json::json;
use shared_error::AppError;
use shared_jwt::Claims;
use shared_types::Scope;
use uuid::Uuid;
use validator::Validate;

use crate::extractors::{ClientInfo, CurrentPrincipal};
use crate::handlers::common::record_mutation;
use crate::state::AppState;

fn to_resp(identity: &Identity) -> IdentityResp {
    IdentityResp {
        id: identity.id,
        tenant_id: identity.tenant_id,
        external_id: identity.external_id.clone(),
        role: identity.role.clone(),
        claims: identity.claims.0.clone(),
        is_active: identity.is_active,
        created_at: identity.created_at,
    }
}

/// Create-or-update an identity by `external_id`. Unauthenticated: the
/// bootstrap endpoint always upserts a system-scoped (`tenant_id: None`)
/// identity (§9 Open Question resolution in `SPEC_FULL.md` §3); tenant
/// assignment happens out of band, via `PUT /identity/{id}` or invitation
/// acceptance.
#[utoipa::path(
    post,
    path = "/v1/identity",
    tag = "identity",
    operation_id = "upsert_identity",
    request_body = UpsertIdentityReq,
    responses(
        (status = 200, description = "Identity created or updated", body = IdentityWithTokenResp),
        (status = 409, description = "Conflicting external_id", body = identity_service_core::dto::ErrorResp),
    )
)]
pub async fn upsert_identity(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(payload): Json<UpsertIdentityReq>,
) -> Result<Json<IdentityWithTokenResp>, AppError> {
    payload.validate()?;

    let existing = state.infra.identities.find_by_external_id(Scope::System, &payload.external_id).await?;
    let now = Utc::now();
    let is_new = existing.is_none();

    let identity = Identity {
        id: existing.as_ref().map(|i| i.id).unwrap_or_else(Uuid::new_v4),
        tenant_id: None,
        external_id: payload.external_id.clone(),
        role: payload.role.clone(),
        claims: sqlx::types::Json(payload.claims.clone()),
        is_active: true,
        sso_provider: existing.as_ref().and_then(|i| i.sso_provider.clone()),
        sso_external_id: existing.as_ref().and_then(|i| i.sso_external_id.clone()),
        created_at: existing.as_ref().map(|i| i.created_at).unwrap_or(now),
        updated_at: now,
    };
    let saved = state.infra.identities.upsert_by_external_id(&identity).await?;

    let claims = Claims::new_access(saved.id, saved.tenant_id, saved.role.clone(), saved.claims.0.clone(), state.config.jwt_access_ttl_seconds);
    let access_token = shared_jwt::encode_jwt(&claims, &state.config.jwt_secret)?;

    let principal = shared_types::Principal { identity_id: saved.id, scope: Scope::System, role: saved.role.clone(), claims: saved.claims.0.clone() };
    let event_type = if is_new { "identity.created" } else { "identity.updated" };
    record_mutation(&state, Scope::System, &principal, event_type, Some(saved.id), "identity", None, Some(json!(to_resp(&saved))), &client).await;

    Ok(Json(IdentityWithTokenResp { identity: to_resp(&saved), access_token, expires_in: state.config.jwt_access_ttl_seconds }))
}

#[utoipa::path(
    get,
    path = "/v1/identity/me",
    tag = "identity",
    operation_id = "get_current_identity",
    responses(
        (status = 200, description = "The authenticated principal's identity", body = IdentityResp),
        (status = 401, description = "No valid credential presented", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_me(State(state): State<AppState>, CurrentPrincipal(principal): CurrentPrincipal) -> Result<Json<IdentityResp>, AppError> {
    let identity = state
        .infra
        .identities
        .find_by_id(principal.scope, principal.identity_id)
        .await?
        .ok_or_else(|| AppError::NotFound("identity not found".to_string()))?;
    Ok(Json(to_resp(&identity)))
}

#[utoipa::path(
    get,
    path = "/v1/identity/{id}",
    tag = "identity",
    operation_id = "get_identity",
    params(("id" = Uuid, Path, description = "Identity id")),
    responses(
        (status = 200, description = "Identity found", body = IdentityResp),
        (status = 403, description = "Not permitted", body = identity_service_core::dto::ErrorResp),
        (status = 404, description = "Not found", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_identity(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> Result<Json<IdentityResp>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "read", "identity", &EvalContext::default())
        .await?;
    let identity = state
        .infra
        .identities
        .find_by_id(principal.scope, id)
        .await?
        .ok_or_else(|| AppError::NotFound("identity not found".to_string()))?;
    Ok(Json(to_resp(&identity)))
}

#[utoipa::path(
    put,
    path = "/v1/identity/{id}",
    tag = "identity",
    operation_id = "update_identity",
    params(("id" = Uuid, Path, description = "Identity id")),
    request_body = UpdateIdentityReq,
    responses(
        (status = 200, description = "Identity updated", body = IdentityResp),
        (status = 403, description = "Not permitted", body = identity_service_core::dto::ErrorResp),
        (status = 404, description = "Not found", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_identity(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    client: ClientInfo,
    Json(payload): Json<UpdateIdentityReq>,
) -> Result<Json<IdentityResp>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "write", "identity", &EvalContext::default())
        .await?;
    let existing = state
        .infra
        .identities
        .find_by_id(principal.scope, id)
        .await?
        .ok_or_else(|| AppError::NotFound("identity not found".to_string()))?;
    let before = to_resp(&existing);

    let updated = Identity {
        role: payload.role.unwrap_or(existing.role),
        claims: payload.claims.map(sqlx::types::Json).unwrap_or(existing.claims),
        is_active: payload.is_active.unwrap_or(existing.is_active),
        updated_at: Utc::now(),
        ..existing
    };
    let saved = state.infra.identities.update(&updated).await?;

    record_mutation(
        &state,
        principal.scope,
        &principal,
        "identity.updated",
        Some(saved.id),
        "identity",
        Some(json!(before)),
        Some(json!(to_resp(&saved))),
        &client,
    )
    .await;

    Ok(Json(to_resp(&saved)))
}

#[utoipa::path(
    delete,
    path = "/v1/identity/{id}",
    tag = "identity",
    operation_id = "delete_identity",
    params(("id" = Uuid, Path, description = "Identity id")),
    responses(
        (status = 200, description = "Identity deactivated"),
        (status = 403, description = "Not permitted", body = identity_service_core::dto::ErrorResp),
        (status = 404, description = "Not found", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_identity(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    client: ClientInfo,
) -> Result<(), AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "delete", "identity", &EvalContext::default())
        .await?;
    state
        .infra
        .identities
        .find_by_id(principal.scope, id)
        .await?
        .ok_or_else(|| AppError::NotFound("identity not found".to_string()))?;
    state.infra.identities.deactivate(principal.scope, id).await?;

    record_mutation(&state, principal.scope, &principal, "identity.deleted", Some(id), "identity", None, None, &client).await;
    Ok(())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/identity", post(upsert_identity))
        .route("/identity/me", get(get_me))
        .route("/identity/{id}", get(get_identity).put(update_identity).delete(delete_identity))
}
