//! `GET /usage/events`, `GET /usage/daily`, `GET /usage/summary`,
//! `POST /usage/aggregate` (§6).

use axum::{extract::{Query, State}, routing::{get, post}, Json, Router};
use identity_service_core::dto::{UsageDailyResp, UsageEventResp, UsageRangeQuery, UsageSummaryResp};
use identity_service_core::model::{UsageDaily, UsageEvent};
use identity_service_core::policy_eval::EvalContext;
use shared_error::AppError;

use crate::extractors::CurrentPrincipal;
use crate::handlers::common::{paging, PageQuery};
use crate::state::AppState;

fn event_to_resp(event: &UsageEvent) -> UsageEventResp {
    UsageEventResp { id: event.id, event: event.event.clone(), units: event.units, created_at: event.created_at }
}

fn daily_to_resp(row: &UsageDaily) -> UsageDailyResp {
    UsageDailyResp { date: row.date, event: row.event.clone(), units: row.units }
}

#[utoipa::path(
    get,
    path = "/v1/usage/events",
    tag = "usage",
    operation_id = "list_usage_events",
    params(PageQuery),
    responses((status = 200, description = "Raw usage events for the caller's tenant", body = [UsageEventResp])),
    security(("bearer_auth" = []))
)]
pub async fn list_usage_events(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<UsageEventResp>>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "read", "usage", &EvalContext::default())
        .await?;
    let events = state.infra.audit_usage.list_events(principal.scope, paging(&query)).await?;
    Ok(Json(events.iter().map(event_to_resp).collect()))
}

/// Per-day, per-event breakdown over `[from, to]` (§4.10).
#[utoipa::path(
    get,
    path = "/v1/usage/daily",
    tag = "usage",
    operation_id = "list_usage_daily",
    params(UsageRangeQuery),
    responses((status = 200, description = "Daily usage aggregates for the caller's tenant", body = [UsageDailyResp])),
    security(("bearer_auth" = []))
)]
pub async fn list_usage_daily(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(query): Query<UsageRangeQuery>,
) -> Result<Json<Vec<UsageDailyResp>>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "read", "usage", &EvalContext::default())
        .await?;
    let rows = state.infra.audit_usage.daily_summary(principal.scope, query.from, query.to).await?;
    Ok(Json(rows.iter().map(daily_to_resp).collect()))
}

/// Same aggregate as `GET /usage/daily`, wrapped with the requested
/// range for callers that want a single summary payload rather than a
/// bare list (§6).
#[utoipa::path(
    get,
    path = "/v1/usage/summary",
    tag = "usage",
    operation_id = "usage_summary",
    params(UsageRangeQuery),
    responses((status = 200, description = "Usage totals over the requested range", body = UsageSummaryResp)),
    security(("bearer_auth" = []))
)]
pub async fn usage_summary(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(query): Query<UsageRangeQuery>,
) -> Result<Json<UsageSummaryResp>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "read", "usage", &EvalContext::default())
        .await?;
    let rows = state.infra.audit_usage.daily_summary(principal.scope, query.from, query.to).await?;
    Ok(Json(UsageSummaryResp { from: query.from, to: query.to, totals: rows.iter().map(daily_to_resp).collect() }))
}

/// Manually trigger `aggregate_usage` (C11) for a date range instead of
/// waiting for the hourly worker tick — operator/admin escape hatch.
#[utoipa::path(
    post,
    path = "/v1/usage/aggregate",
    tag = "usage",
    operation_id = "aggregate_usage",
    params(UsageRangeQuery),
    responses((status = 200, description = "Count of (tenant, date, event) rows upserted")),
    security(("bearer_auth" = []))
)]
pub async fn aggregate_usage(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Query(query): Query<UsageRangeQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .infra
        .policy_engine
        .authorize(&principal, "write", "usage", &EvalContext::default())
        .await?;
    let dates: Vec<chrono::NaiveDate> = {
        let mut dates = Vec::new();
        let mut d = query.from;
        while d <= query.to {
            dates.push(d);
            d += chrono::Duration::days(1);
        }
        dates
    };
    let count = state.infra.audit_usage.aggregate_usage(&dates).await?;
    Ok(Json(serde_json::json!({"rows_upserted": count})))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/usage/events", get(list_usage_events))
        .route("/usage/daily", get(list_usage_daily))
        .route("/usage/summary", get(usage_summary))
        .route("/usage/aggregate", post(aggregate_usage))
}

