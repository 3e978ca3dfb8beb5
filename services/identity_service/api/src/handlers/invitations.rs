//! `POST /invitations`, `GET /invitations`, `POST /invitations/accept/{token}`,
//! `DELETE /invitations/{id}` (§6).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use identity_service_core::dto::{AcceptInvitationReq, CreateInvitationReq, InvitationCreatedResp, InvitationResp, SessionTokenResp};
use identity_service_core::model::{Identity, Invitation, InvitationState};
use identity_service_core::policy_eval::EvalContext;
use identity_service_core::service::SessionRequestMetadata;
use rand::RngCore;
use serde_json::json;
use sha2::{Digest, Sha256};
use shared_error::AppError;
use shared_types::{Principal, Scope};
use uuid::Uuid;
use validator::Validate;

use crate::extractors::{ClientInfo, CurrentPrincipal};
use crate::handlers::common::record_mutation;
use crate::state::AppState;

fn to_resp(invitation: &Invitation, now: chrono::DateTime<Utc>) -> InvitationResp {
    InvitationResp {
        id: invitation.id,
        email: invitation.email.clone(),
        role: invitation.role.clone(),
        is_accepted: invitation.state(now) == InvitationState::Accepted,
        expires_at: invitation.expires_at,
        created_at: invitation.created_at,
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("inv_{}", hex::encode(bytes))
}

#[utoipa::path(
    post,
    path = "/v1/invitations",
    tag = "invitations",
    operation_id = "create_invitation",
    request_body = CreateInvitationReq,
    responses((status = 201, description = "Invitation issued; token returned once", body = InvitationCreatedResp)),
    security(("bearer_auth" = []))
)]
pub async fn create_invitation(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    client: ClientInfo,
    Json(payload): Json<CreateInvitationReq>,
) -> Result<(StatusCode, Json<InvitationCreatedResp>), AppError> {
    payload.validate()?;
    state
        .infra
        .policy_engine
        .authorize(&principal, "write", "invitation", &EvalContext::default())
        .await?;
    let tenant_id = principal
        .scope
        .tenant_id()
        .ok_or_else(|| AppError::ValidationFailed("invitations require a tenant-scoped caller".to_string()))?;

    let token = generate_token();
    let token_hash = hex::encode(Sha256::digest(token.as_bytes()));
    let now = Utc::now();

    let invitation = Invitation {
        id: Uuid::new_v4(),
        tenant_id,
        email: payload.email.clone(),
        role: payload.role.clone(),
        claims: sqlx::types::Json(payload.claims.clone()),
        token_hash,
        invited_by: Some(principal.identity_id),
        is_accepted: false,
        accepted_at: None,
        expires_at: now + chrono::Duration::days(payload.expires_in_days.unwrap_or(7)),
        created_at: now,
        updated_at: now,
    };
    let saved = state.infra.invitations.create(&invitation).await?;

    record_mutation(
        &state,
        principal.scope,
        &principal,
        "invitation.created",
        Some(saved.id),
        "invitation",
        None,
        Some(json!(to_resp(&saved, now))),
        &client,
    )
    .await;

    Ok((StatusCode::CREATED, Json(InvitationCreatedResp { invitation: to_resp(&saved, now), token })))
}

#[utoipa::path(
    get,
    path = "/v1/invitations",
    tag = "invitations",
    operation_id = "list_invitations",
    responses((status = 200, description = "Invitations for the caller's tenant", body = [InvitationResp])),
    security(("bearer_auth" = []))
)]
pub async fn list_invitations(State(state): State<AppState>, CurrentPrincipal(principal): CurrentPrincipal) -> Result<Json<Vec<InvitationResp>>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "read", "invitation", &EvalContext::default())
        .await?;
    let now = Utc::now();
    let invitations = state.infra.invitations.list_for_tenant(principal.scope).await?;
    Ok(Json(invitations.iter().map(|i| to_resp(i, now)).collect()))
}

/// Unauthenticated: the presented token is itself the credential. Accepting
/// provisions (or reuses) an identity scoped to the invitation's tenant —
/// the other of the two ways a tenant-scoped identity gets created, besides
/// `PUT /identity/{id}`.
#[utoipa::path(
    post,
    path = "/v1/invitations/accept/{token}",
    tag = "invitations",
    operation_id = "accept_invitation",
    params(("token" = String, Path, description = "Opaque invitation token")),
    request_body = AcceptInvitationReq,
    responses(
        (status = 200, description = "Invitation accepted; tenant-scoped session issued", body = SessionTokenResp),
        (status = 404, description = "Invitation not found", body = identity_service_core::dto::ErrorResp),
        (status = 409, description = "Invitation already accepted or expired", body = identity_service_core::dto::ErrorResp),
    )
)]
pub async fn accept_invitation(
    State(state): State<AppState>,
    Path(token): Path<String>,
    client: ClientInfo,
    Json(payload): Json<AcceptInvitationReq>,
) -> Result<Json<SessionTokenResp>, AppError> {
    payload.validate()?;
    let token_hash = hex::encode(Sha256::digest(token.as_bytes()));
    let invitation = state
        .infra
        .invitations
        .find_by_token_hash(&token_hash)
        .await?
        .ok_or_else(|| AppError::NotFound("invitation not found".to_string()))?;

    let now = Utc::now();
    match invitation.state(now) {
        InvitationState::Pending => {}
        InvitationState::Expired => return Err(AppError::Conflict("invitation has expired".to_string())),
        InvitationState::Accepted => return Err(AppError::Conflict("invitation already accepted".to_string())),
        InvitationState::Revoked => return Err(AppError::Conflict("invitation was revoked".to_string())),
    }

    let scope = Scope::Tenant(invitation.tenant_id);
    let existing = state.infra.identities.find_by_external_id(scope, &payload.external_id).await?;
    let identity = Identity {
        id: existing.as_ref().map(|i| i.id).unwrap_or_else(Uuid::new_v4),
        tenant_id: Some(invitation.tenant_id),
        external_id: payload.external_id.clone(),
        role: invitation.role.clone(),
        claims: existing.as_ref().map(|i| i.claims.clone()).unwrap_or_else(|| invitation.claims.clone()),
        is_active: true,
        sso_provider: existing.as_ref().and_then(|i| i.sso_provider.clone()),
        sso_external_id: existing.as_ref().and_then(|i| i.sso_external_id.clone()),
        created_at: existing.as_ref().map(|i| i.created_at).unwrap_or(now),
        updated_at: now,
    };
    let saved_identity = state.infra.identities.upsert_by_external_id(&identity).await?;
    state.infra.invitations.mark_accepted(scope, invitation.id, now).await?;

    let issued = state
        .infra
        .session_service
        .issue(
            &saved_identity,
            SessionRequestMetadata { ip: client.ip_address.clone(), user_agent: client.user_agent.clone() },
            state.config.jwt_refresh_ttl_days,
        )
        .await?;

    let principal = Principal {
        identity_id: saved_identity.id,
        scope,
        role: saved_identity.role.clone(),
        claims: saved_identity.claims.0.clone(),
    };
    record_mutation(&state, scope, &principal, "invitation.accepted", Some(invitation.id), "invitation", None, None, &client).await;

    Ok(Json(SessionTokenResp { access_token: issued.access_token, refresh_token: issued.refresh_token, expires_in: issued.expires_in }))
}

#[utoipa::path(
    delete,
    path = "/v1/invitations/{id}",
    tag = "invitations",
    operation_id = "revoke_invitation",
    params(("id" = Uuid, Path, description = "Invitation id")),
    responses(
        (status = 204, description = "Invitation revoked"),
        (status = 404, description = "Not found", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn revoke_invitation(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    client: ClientInfo,
) -> Result<StatusCode, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "delete", "invitation", &EvalContext::default())
        .await?;
    state
        .infra
        .invitations
        .find_by_id(principal.scope, id)
        .await?
        .ok_or_else(|| AppError::NotFound("invitation not found".to_string()))?;
    state.infra.invitations.delete(principal.scope, id).await?;
    record_mutation(&state, principal.scope, &principal, "invitation.revoked", Some(id), "invitation", None, None, &client).await;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/invitations", post(create_invitation).get(list_invitations))
        .route("/invitations/accept/{token}", post(accept_invitation))
        .route("/invitations/{id}", axum::routing::delete(revoke_invitation))
}
