//! `POST/GET /webhooks`, `PUT/DELETE /webhooks/{id}`,
//! `GET /webhooks/{id}/deliveries`, `POST /webhooks/{id}/deliveries/{delivery_id}/retry` (§6).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use identity_service_core::dto::{CreateWebhookReq, UpdateWebhookReq, WebhookDeliveryResp, WebhookResp};
use identity_service_core::model::{Webhook, WebhookDelivery};
use identity_service_core::policy_eval::EvalContext;
use identity_service_core::repository::Paging;
use rand::RngCore;
use serde_json::json;
use shared_error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::extractors::{ClientInfo, CurrentPrincipal};
use crate::handlers::common::{paging, record_mutation, PageQuery};
use crate::state::AppState;

fn to_resp(webhook: &Webhook) -> WebhookResp {
    WebhookResp {
        id: webhook.id,
        name: webhook.name.clone(),
        url: webhook.url.clone(),
        events: webhook.events.clone(),
        is_active: webhook.is_active,
        created_at: webhook.created_at,
    }
}

fn delivery_to_resp(delivery: &WebhookDelivery) -> WebhookDeliveryResp {
    WebhookDeliveryResp {
        id: delivery.id,
        event_type: delivery.event_type.clone(),
        status: format!("{:?}", delivery.status).to_lowercase(),
        response_code: delivery.response_code,
        delivery_attempts: delivery.delivery_attempts,
        next_retry_at: delivery.next_retry_at,
        delivered_at: delivery.delivered_at,
        created_at: delivery.created_at,
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[utoipa::path(
    post,
    path = "/v1/webhooks",
    tag = "webhooks",
    operation_id = "create_webhook",
    request_body = CreateWebhookReq,
    responses((status = 201, description = "Webhook subscription created", body = WebhookResp)),
    security(("bearer_auth" = []))
)]
pub async fn create_webhook(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    client: ClientInfo,
    Json(payload): Json<CreateWebhookReq>,
) -> Result<(StatusCode, Json<WebhookResp>), AppError> {
    payload.validate()?;
    state
        .infra
        .policy_engine
        .authorize(&principal, "write", "webhook", &EvalContext::default())
        .await?;
    let now = Utc::now();

    let webhook = Webhook {
        id: Uuid::new_v4(),
        tenant_id: principal.scope.tenant_id(),
        name: payload.name.clone(),
        url: payload.url.clone(),
        events: payload.events.clone(),
        secret: generate_secret(),
        is_active: true,
        created_by: principal.identity_id,
        created_at: now,
        updated_at: now,
    };
    let saved = state.infra.webhook_pipeline.create(&webhook).await?;

    record_mutation(
        &state,
        principal.scope,
        &principal,
        "webhook.created",
        Some(saved.id),
        "webhook",
        None,
        Some(json!(to_resp(&saved))),
        &client,
    )
    .await;

    Ok((StatusCode::CREATED, Json(to_resp(&saved))))
}

#[utoipa::path(
    get,
    path = "/v1/webhooks",
    tag = "webhooks",
    operation_id = "list_webhooks",
    responses((status = 200, description = "Webhook subscriptions for the caller's tenant", body = [WebhookResp])),
    security(("bearer_auth" = []))
)]
pub async fn list_webhooks(State(state): State<AppState>, CurrentPrincipal(principal): CurrentPrincipal) -> Result<Json<Vec<WebhookResp>>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "read", "webhook", &EvalContext::default())
        .await?;
    let webhooks = state.infra.webhook_pipeline.list(principal.scope).await?;
    Ok(Json(webhooks.iter().map(to_resp).collect()))
}

#[utoipa::path(
    get,
    path = "/v1/webhooks/{id}",
    tag = "webhooks",
    operation_id = "get_webhook",
    params(("id" = Uuid, Path, description = "Webhook id")),
    responses(
        (status = 200, description = "Webhook found", body = WebhookResp),
        (status = 404, description = "Not found", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_webhook(State(state): State<AppState>, CurrentPrincipal(principal): CurrentPrincipal, Path(id): Path<Uuid>) -> Result<Json<WebhookResp>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "read", "webhook", &EvalContext::default())
        .await?;
    let webhook = state
        .infra
        .webhooks
        .find_by_id(principal.scope, id)
        .await?
        .ok_or_else(|| AppError::NotFound("webhook not found".to_string()))?;
    Ok(Json(to_resp(&webhook)))
}

#[utoipa::path(
    put,
    path = "/v1/webhooks/{id}",
    tag = "webhooks",
    operation_id = "update_webhook",
    params(("id" = Uuid, Path, description = "Webhook id")),
    request_body = UpdateWebhookReq,
    responses(
        (status = 200, description = "Webhook updated", body = WebhookResp),
        (status = 404, description = "Not found", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_webhook(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    client: ClientInfo,
    Json(payload): Json<UpdateWebhookReq>,
) -> Result<Json<WebhookResp>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "write", "webhook", &EvalContext::default())
        .await?;
    let existing = state
        .infra
        .webhooks
        .find_by_id(principal.scope, id)
        .await?
        .ok_or_else(|| AppError::NotFound("webhook not found".to_string()))?;
    let before = to_resp(&existing);

    let updated = Webhook {
        name: payload.name.unwrap_or(existing.name),
        url: payload.url.unwrap_or(existing.url),
        events: payload.events.unwrap_or(existing.events),
        is_active: payload.is_active.unwrap_or(existing.is_active),
        updated_at: Utc::now(),
        ..existing
    };
    let saved = state.infra.webhook_pipeline.update(&updated).await?;

    record_mutation(
        &state,
        principal.scope,
        &principal,
        "webhook.updated",
        Some(saved.id),
        "webhook",
        Some(json!(before)),
        Some(json!(to_resp(&saved))),
        &client,
    )
    .await;

    Ok(Json(to_resp(&saved)))
}

#[utoipa::path(
    delete,
    path = "/v1/webhooks/{id}",
    tag = "webhooks",
    operation_id = "delete_webhook",
    params(("id" = Uuid, Path, description = "Webhook id")),
    responses(
        (status = 204, description = "Webhook deleted"),
        (status = 404, description = "Not found", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_webhook(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    client: ClientInfo,
) -> Result<StatusCode, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "delete", "webhook", &EvalContext::default())
        .await?;
    state
        .infra
        .webhooks
        .find_by_id(principal.scope, id)
        .await?
        .ok_or_else(|| AppError::NotFound("webhook not found".to_string()))?;
    state.infra.webhook_pipeline.delete(principal.scope, id).await?;
    record_mutation(&state, principal.scope, &principal, "webhook.deleted", Some(id), "webhook", None, None, &client).await;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/v1/webhooks/{id}/deliveries",
    tag = "webhooks",
    operation_id = "list_webhook_deliveries",
    params(("id" = Uuid, Path, description = "Webhook id"), PageQuery),
    responses((status = 200, description = "Delivery attempts for this webhook", body = [WebhookDeliveryResp])),
    security(("bearer_auth" = []))
)]
pub async fn list_webhook_deliveries(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<WebhookDeliveryResp>>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "read", "webhook", &EvalContext::default())
        .await?;
    let deliveries = state
        .infra
        .webhook_pipeline
        .list_deliveries(principal.scope, id, paging(&query))
        .await?;
    Ok(Json(deliveries.iter().map(delivery_to_resp).collect()))
}

#[utoipa::path(
    post,
    path = "/v1/webhooks/{id}/deliveries/{delivery_id}/retry",
    tag = "webhooks",
    operation_id = "retry_webhook_delivery",
    params(("id" = Uuid, Path, description = "Webhook id"), ("delivery_id" = Uuid, Path, description = "Delivery id")),
    responses(
        (status = 200, description = "Delivery re-attempted immediately", body = WebhookDeliveryResp),
        (status = 404, description = "Not found", body = identity_service_core::dto::ErrorResp),
    ),
    security(("bearer_auth" = []))
)]
pub async fn retry_webhook_delivery(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path((_id, delivery_id)): Path<(Uuid, Uuid)>,
    client: ClientInfo,
) -> Result<Json<WebhookDeliveryResp>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "write", "webhook", &EvalContext::default())
        .await?;
    let delivery = state.infra.webhook_pipeline.retry_delivery(principal.scope, delivery_id).await?;
    record_mutation(
        &state,
        principal.scope,
        &principal,
        "webhook.delivery_retried",
        Some(delivery.id),
        "webhook_delivery",
        None,
        Some(json!(delivery_to_resp(&delivery))),
        &client,
    )
    .await;
    Ok(Json(delivery_to_resp(&delivery)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/webhooks", axum::routing::post(create_webhook).get(list_webhooks))
        .route("/webhooks/{id}", get(get_webhook).put(update_webhook).delete(delete_webhook))
        .route("/webhooks/{id}/deliveries", get(list_webhook_deliveries))
        .route("/webhooks/{id}/deliveries/{delivery_id}/retry", axum::routing::post(retry_webhook_delivery))
}
