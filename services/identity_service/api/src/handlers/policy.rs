//! `POST/GET/PUT/DELETE /policy[/{id}]`, `POST /policy/test`,
//! `POST /policy/bulk-delete` (§6).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use identity_service_core::dto::{BulkDeletePolicyReq, CreatePolicyReq, PolicyResp, TestPolicyReq, TestPolicyResp, UpdatePolicyReq};
use identity_service_core::model::Policy;
use identity_service_core::policy_eval::EvalContext;
use serde_json::json;
use shared_error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::extractors::{ClientInfo, CurrentPrincipal};
use crate::handlers::common::record_mutation;
use crate::state::AppState;

fn to_resp(policy: &Policy) -> PolicyResp {
    PolicyResp {
        id: policy.id,
        role: policy.role.clone(),
        rule: policy.rule.0.clone(),
        description: policy.description.clone(),
        priority: policy.priority,
        is_active: policy.is_active,
        created_at: policy.created_at,
    }
}

#[utoipa::path(
    post,
    path = "/v1/policy",
    tag = "policy",
    operation_id = "create_policy",
    request_body = CreatePolicyReq,
    responses((status = 201, description = "Policy rule created", body = PolicyResp)),
    security(("bearer_auth" = []))
)]
pub async fn create_policy(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    client: ClientInfo,
    Json(payload): Json<CreatePolicyReq>,
) -> Result<(StatusCode, Json<PolicyResp>), AppError> {
    payload.validate()?;
    state
        .infra
        .policy_engine
        .authorize(&principal, "write", "policy", &EvalContext::default())
        .await?;
    let tenant_id = principal.scope.tenant_id();
    let now = Utc::now();

    let policy = Policy {
        id: Uuid::new_v4(),
        tenant_id,
        role: payload.role.clone(),
        rule: sqlx::types::Json(payload.rule.clone()),
        description: payload.description.clone(),
        priority: payload.priority,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    let saved = state.infra.policy_engine.create_policy(&policy).await?;

    record_mutation(&state, principal.scope, &principal, "policy.created", Some(saved.id), "policy", None, Some(json!(to_resp(&saved))), &client).await;

    Ok((StatusCode::CREATED, Json(to_resp(&saved))))
}

#[utoipa::path(
    get,
    path = "/v1/policy",
    tag = "policy",
    operation_id = "list_policy",
    responses((status = 200, description = "Policy rules visible to the caller's tenant", body = [PolicyResp])),
    security(("bearer_auth" = []))
)]
pub async fn list_policy(State(state): State<AppState>, CurrentPrincipal(principal): CurrentPrincipal) -> Result<Json<Vec<PolicyResp>>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "read", "policy", &EvalContext::default())
        .await?;
    let policies = state.infra.policies.list_for_tenant(principal.scope).await?;
    Ok(Json(policies.iter().map(to_resp).collect()))
}

#[utoipa::path(
    get,
    path = "/v1/policy/{id}",
    tag = "policy",
    operation_id = "get_policy",
    params(("id" = Uuid, Path, description = "Policy id")),
    responses(
        (status = 200, description = "Policy found", body = PolicyResp),
        (status = 404, description = "Not found", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_policy(State(state): State<AppState>, CurrentPrincipal(principal): CurrentPrincipal, Path(id): Path<Uuid>) -> Result<Json<PolicyResp>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "read", "policy", &EvalContext::default())
        .await?;
    let policy = state
        .infra
        .policies
        .find_by_id(principal.scope, id)
        .await?
        .ok_or_else(|| AppError::NotFound("policy not found".to_string()))?;
    Ok(Json(to_resp(&policy)))
}

#[utoipa::path(
    put,
    path = "/v1/policy/{id}",
    tag = "policy",
    operation_id = "update_policy",
    params(("id" = Uuid, Path, description = "Policy id")),
    request_body = UpdatePolicyReq,
    responses(
        (status = 200, description = "Policy updated", body = PolicyResp),
        (status = 404, description = "Not found", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_policy(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    client: ClientInfo,
    Json(payload): Json<UpdatePolicyReq>,
) -> Result<Json<PolicyResp>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "write", "policy", &EvalContext::default())
        .await?;
    let existing = state
        .infra
        .policies
        .find_by_id(principal.scope, id)
        .await?
        .ok_or_else(|| AppError::NotFound("policy not found".to_string()))?;
    let before = to_resp(&existing);

    let updated = Policy {
        role: payload.role.unwrap_or(existing.role),
        rule: payload.rule.map(sqlx::types::Json).unwrap_or(existing.rule),
        description: payload.description.or(existing.description),
        priority: payload.priority.unwrap_or(existing.priority),
        is_active: payload.is_active.unwrap_or(existing.is_active),
        updated_at: Utc::now(),
        ..existing
    };
    let saved = state.infra.policy_engine.update_policy(&updated).await?;

    record_mutation(
        &state,
        principal.scope,
        &principal,
        "policy.updated",
        Some(saved.id),
        "policy",
        Some(json!(before)),
        Some(json!(to_resp(&saved))),
        &client,
    )
    .await;

    Ok(Json(to_resp(&saved)))
}

#[utoipa::path(
    delete,
    path = "/v1/policy/{id}",
    tag = "policy",
    operation_id = "delete_policy",
    params(("id" = Uuid, Path, description = "Policy id")),
    responses(
        (status = 204, description = "Policy deleted"),
        (status = 404, description = "Not found", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_policy(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    client: ClientInfo,
) -> Result<StatusCode, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "delete", "policy", &EvalContext::default())
        .await?;
    state
        .infra
        .policies
        .find_by_id(principal.scope, id)
        .await?
        .ok_or_else(|| AppError::NotFound("policy not found".to_string()))?;
    state.infra.policy_engine.delete_policy(principal.scope, id).await?;
    record_mutation(&state, principal.scope, &principal, "policy.deleted", Some(id), "policy", None, None, &client).await;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/policy/bulk-delete",
    tag = "policy",
    operation_id = "bulk_delete_policy",
    request_body = BulkDeletePolicyReq,
    responses((status = 200, description = "Count of policies deleted")),
    security(("bearer_auth" = []))
)]
pub async fn bulk_delete_policy(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    client: ClientInfo,
    Json(payload): Json<BulkDeletePolicyReq>,
) -> Result<Json<serde_json::Value>, AppError> {
    payload.validate()?;
    state
        .infra
        .policy_engine
        .authorize(&principal, "delete", "policy", &EvalContext::default())
        .await?;
    let count = state.infra.policy_engine.bulk_delete(principal.scope, &payload.ids).await?;
    record_mutation(
        &state,
        principal.scope,
        &principal,
        "policy.bulk_deleted",
        None,
        "policy",
        None,
        Some(json!({"deleted_count": count, "ids": payload.ids})),
        &client,
    )
    .await;
    Ok(Json(json!({"deleted_count": count})))
}

#[utoipa::path(
    post,
    path = "/v1/policy/test",
    tag = "policy",
    operation_id = "test_policy",
    request_body = TestPolicyReq,
    responses((status = 200, description = "Evaluated effect without requiring a stored policy", body = TestPolicyResp)),
    security(("bearer_auth" = []))
)]
pub async fn test_policy(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(payload): Json<TestPolicyReq>,
) -> Result<Json<TestPolicyResp>, AppError> {
    payload.validate()?;
    let ctx = EvalContext {
        client_ip: payload.client_ip.clone(),
        resource_memory_type: payload.resource_memory_type.clone(),
        resource_metadata: payload.resource_metadata.clone(),
    };
    let effect = state.infra.policy_engine.test(&principal, &payload.action, &payload.resource, &ctx).await?;
    Ok(Json(TestPolicyResp { effect }))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/policy", post(create_policy).get(list_policy))
        .route("/policy/test", post(test_policy))
        .route("/policy/bulk-delete", post(bulk_delete_policy))
        .route("/policy/{id}", get(get_policy).put(update_policy).delete(delete_policy))
}
