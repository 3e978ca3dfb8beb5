//! Shared helpers used by every handler module: the audit-plus-event
//! emission every mutating operation performs (I4, §4.8/§4.10), and the
//! `limit`/`offset` query defaults used by every list endpoint.

use chrono::Utc;
use identity_service_core::model::AuditLog;
use identity_service_core::repository::Paging;
use serde::Deserialize;
use serde_json::Value;
use shared_error::AppError;
use shared_types::{Principal, Scope};
use uuid::Uuid;
use utoipa::IntoParams;

use crate::extractors::ClientInfo;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub fn paging(query: &PageQuery) -> Paging {
    Paging { limit: query.limit.unwrap_or(50).clamp(1, 200), offset: query.offset.unwrap_or(0).max(0) }
}

/// Appends one `AuditLog` row and publishes one lifecycle event for a
/// mutating operation. Audit failures are logged, never surfaced to the
/// caller (§7: "Audit logging never raises to the caller"); the mutation
/// itself has already succeeded by the time this runs.
#[allow(clippy::too_many_arguments)]
pub async fn record_mutation(
    state: &AppState,
    scope: Scope,
    principal: &Principal,
    event_type: &str,
    resource_id: Option<Uuid>,
    resource_type: &str,
    before: Option<Value>,
    after: Option<Value>,
    client: &ClientInfo,
) {
    let entry = AuditLog {
        id: Uuid::new_v4(),
        tenant_id: scope.tenant_id(),
        event_type: event_type.to_string(),
        actor_id: Some(principal.identity_id),
        resource_id,
        resource_type: Some(resource_type.to_string()),
        before_state: before.map(sqlx::types::Json),
        after_state: after.clone().map(sqlx::types::Json),
        meta: sqlx::types::Json(Value::Null),
        ip: client.ip_address.clone(),
        user_agent: client.user_agent.clone(),
        timestamp: Utc::now(),
    };
    if let Err(e) = state.infra.audit_usage.record_audit(entry).await {
        tracing::error!(%e, event_type, "failed to append audit log");
    }

    state.metrics.record_event(event_type);

    let payload = after.unwrap_or(Value::Null);
    if let Err(e) = state
        .infra
        .event_bus
        .publish(scope, event_type, resource_id, Some(principal.identity_id), payload)
        .await
    {
        tracing::error!(%e, event_type, "failed to publish lifecycle event");
    }
}

/// `AppError::AccessDenied` shaped for a check this module runs itself
/// (outside `PolicyEngine::authorize`) — kept here so every handler
/// raises the same diagnostic shape §7 requires.
pub fn access_denied(action: &str, resource: &str) -> AppError {
    AppError::AccessDenied { action: action.to_string(), resource: resource.to_string() }
}
