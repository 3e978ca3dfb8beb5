//! `POST /memory`, `GET /memory/{id}`, `GET /memory`, `POST /memory/search`,
//! `PUT/DELETE /memory/{id}` (§6).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use identity_service_core::dto::{CreateMemoryReq, MemoryResp, SearchMemoryReq, SearchMemoryResp, UpdateMemoryReq};
use identity_service_core::model::Memory;
use identity_service_core::policy_eval::EvalContext;
use identity_service_core::repository::MemoryFilters;
use identity_service_core::service::{MemoryPatch, SearchMode};
use serde_json::json;
use shared_error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::extractors::{ClientInfo, CurrentPrincipal};
use crate::handlers::common::{paging, record_mutation, PageQuery};
use crate::state::AppState;

fn to_resp(memory: &Memory) -> MemoryResp {
    MemoryResp {
        id: memory.id,
        identity_id: memory.identity_id,
        text: memory.text.clone(),
        r#type: memory.r#type.clone(),
        metadata: memory.metadata.0.clone(),
        score: memory.score,
        version: memory.version,
        ttl_days: memory.ttl_days,
        has_vector: memory.vector.is_some(),
        is_deleted: memory.is_deleted,
        created_at: memory.created_at,
        updated_at: memory.updated_at,
    }
}

#[utoipa::path(
    post,
    path = "/v1/memory",
    tag = "memory",
    operation_id = "create_memory",
    request_body = CreateMemoryReq,
    responses((status = 201, description = "Memory record created", body = MemoryResp)),
    security(("bearer_auth" = []))
)]
pub async fn create_memory(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    client: ClientInfo,
    Json(payload): Json<CreateMemoryReq>,
) -> Result<(StatusCode, Json<MemoryResp>), AppError> {
    payload.validate()?;
    state
        .infra
        .policy_engine
        .authorize(
            &principal,
            "write",
            "memory",
            &EvalContext { resource_memory_type: Some(payload.r#type.clone()), ..Default::default() },
        )
        .await?;

    let saved = state
        .infra
        .memory_core
        .create(principal.scope, principal.identity_id, payload.text.clone(), payload.r#type.clone(), payload.metadata.clone(), payload.ttl_days)
        .await?;

    record_mutation(&state, principal.scope, &principal, "memory.created", Some(saved.id), "memory", None, Some(json!(to_resp(&saved))), &client).await;

    Ok((StatusCode::CREATED, Json(to_resp(&saved))))
}

#[utoipa::path(
    get,
    path = "/v1/memory/{id}",
    tag = "memory",
    operation_id = "get_memory",
    params(("id" = Uuid, Path, description = "Memory id")),
    responses(
        (status = 200, description = "Memory found", body = MemoryResp),
        (status = 404, description = "Not found", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_memory(State(state): State<AppState>, CurrentPrincipal(principal): CurrentPrincipal, Path(id): Path<Uuid>) -> Result<Json<MemoryResp>, AppError> {
    let memory = state.infra.memory_core.get(principal.scope, id, false).await?;
    state
        .infra
        .policy_engine
        .authorize(&principal, "read", "memory", &EvalContext { resource_memory_type: Some(memory.r#type.clone()), ..Default::default() })
        .await?;
    Ok(Json(to_resp(&memory)))
}

#[derive(Debug, Clone, serde::Deserialize, utoipa::IntoParams)]
pub struct MemoryListQuery {
    pub r#type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/v1/memory",
    tag = "memory",
    operation_id = "list_memory",
    params(MemoryListQuery),
    responses((status = 200, description = "Memory records for the caller", body = [MemoryResp])),
    security(("bearer_auth" = []))
)]
pub async fn list_memory(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(query): Query<MemoryListQuery>,
) -> Result<Json<Vec<MemoryResp>>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "read", "memory", &EvalContext { resource_memory_type: query.r#type.clone(), ..Default::default() })
        .await?;
    let page = paging(&PageQuery { limit: query.limit, offset: query.offset });
    let memories = state.infra.memory_core.list(principal.scope, principal.identity_id, query.r#type, page).await?;
    Ok(Json(memories.iter().map(to_resp).collect()))
}

#[utoipa::path(
    post,
    path = "/v1/memory/search",
    tag = "memory",
    operation_id = "search_memory",
    request_body = SearchMemoryReq,
    responses((status = 200, description = "Nearest memories by embedding similarity, or text-match fallback", body = SearchMemoryResp)),
    security(("bearer_auth" = []))
)]
pub async fn search_memory(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Json(payload): Json<SearchMemoryReq>,
) -> Result<Json<SearchMemoryResp>, AppError> {
    payload.validate()?;
    state
        .infra
        .policy_engine
        .authorize(&principal, "read", "memory", &EvalContext { resource_memory_type: payload.r#type.clone(), ..Default::default() })
        .await?;

    let filters = MemoryFilters { r#type: payload.r#type.clone(), metadata_requirements: None };
    let result = state
        .infra
        .memory_core
        .search(principal.scope, principal.identity_id, &payload.query, filters, payload.limit, payload.min_score)
        .await?;

    Ok(Json(SearchMemoryResp {
        results: result.memories.iter().map(to_resp).collect(),
        fallback: result.mode == SearchMode::TextFallback,
    }))
}

#[utoipa::path(
    put,
    path = "/v1/memory/{id}",
    tag = "memory",
    operation_id = "update_memory",
    params(("id" = Uuid, Path, description = "Memory id")),
    request_body = UpdateMemoryReq,
    responses(
        (status = 200, description = "Memory updated", body = MemoryResp),
        (status = 404, description = "Not found", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_memory(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    client: ClientInfo,
    Json(payload): Json<UpdateMemoryReq>,
) -> Result<Json<MemoryResp>, AppError> {
    payload.validate()?;
    let existing = state.infra.memory_core.get(principal.scope, id, false).await?;
    state
        .infra
        .policy_engine
        .authorize(&principal, "write", "memory", &EvalContext { resource_memory_type: Some(existing.r#type.clone()), ..Default::default() })
        .await?;

    let patch = MemoryPatch { text: payload.text, r#type: payload.r#type, metadata: payload.metadata, ttl_days: payload.ttl_days };
    let saved = state.infra.memory_core.update(principal.scope, id, patch).await?;

    record_mutation(
        &state,
        principal.scope,
        &principal,
        "memory.updated",
        Some(saved.id),
        "memory",
        Some(json!(to_resp(&existing))),
        Some(json!(to_resp(&saved))),
        &client,
    )
    .await;

    Ok(Json(to_resp(&saved)))
}

#[derive(Debug, Clone, serde::Deserialize, utoipa::IntoParams)]
pub struct DeleteMemoryQuery {
    #[serde(default)]
    pub hard: bool,
}

#[utoipa::path(
    delete,
    path = "/v1/memory/{id}",
    tag = "memory",
    operation_id = "delete_memory",
    params(("id" = Uuid, Path, description = "Memory id"), DeleteMemoryQuery),
    responses(
        (status = 204, description = "Memory deleted"),
        (status = 404, description = "Not found", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_memory(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteMemoryQuery>,
    client: ClientInfo,
) -> Result<StatusCode, AppError> {
    let existing = state.infra.memory_core.get(principal.scope, id, false).await?;
    state
        .infra
        .policy_engine
        .authorize(&principal, "delete", "memory", &EvalContext { resource_memory_type: Some(existing.r#type.clone()), ..Default::default() })
        .await?;
    state.infra.memory_core.delete(principal.scope, id, query.hard).await?;
    record_mutation(&state, principal.scope, &principal, "memory.deleted", Some(id), "memory", None, None, &client).await;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/memory", post(create_memory).get(list_memory))
        .route("/memory/search", post(search_memory))
        .route("/memory/{id}", get(get_memory).put(update_memory).delete(delete_memory))
}
