//! C10: append-only audit log plus per-tenant per-day usage aggregates
//! (§4.10). `record_audit`'s caller is expected to have already committed
//! the mutation the entry describes in the same transaction (I4); this
//! repository itself does not open one, matching the teacher's
//! one-repository-per-connection-lifetime pattern.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use identity_service_core::model::{AuditLog, UsageEvent};
use identity_service_core::repository::{AuditLogRepository, Paging, UsageRepository};
use identity_service_core::service::AuditUsage;
use shared_error::AppError;
use shared_types::Scope;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct DefaultAuditUsage {
    audit_logs: Arc<dyn AuditLogRepository>,
    usage: Arc<dyn UsageRepository>,
}

impl DefaultAuditUsage {
    pub fn new(audit_logs: Arc<dyn AuditLogRepository>, usage: Arc<dyn UsageRepository>) -> Self {
        Self { audit_logs, usage }
    }
}

#[async_trait]
impl AuditUsage for DefaultAuditUsage {
    async fn record_audit(&self, entry: AuditLog) -> Result<(), AppError> {
        self.audit_logs.append(&entry).await?;
        Ok(())
    }

    async fn record_usage(&self, tenant_id: Uuid, api_key_id: Option<Uuid>, identity_id: Option<Uuid>, event: &str, units: i32) -> Result<(), AppError> {
        let usage_event = UsageEvent {
            id: Uuid::new_v4(),
            tenant_id,
            api_key_id,
            identity_id,
            event: event.to_string(),
            units,
            metadata: sqlx::types::Json(serde_json::json!({})),
            created_at: Utc::now(),
        };
        self.usage.record_event(&usage_event).await?;
        Ok(())
    }

    async fn list_events(&self, scope: Scope, paging: Paging) -> Result<Vec<UsageEvent>, AppError> {
        self.usage.list_events(scope, paging).await
    }

    async fn daily_summary(&self, scope: Scope, from: NaiveDate, to: NaiveDate) -> Result<Vec<identity_service_core::model::UsageDaily>, AppError> {
        self.usage.summary(scope, from, to).await
    }

    async fn aggregate_usage(&self, dates: &[NaiveDate]) -> Result<u64, AppError> {
        let events = self.usage.list_events_for_dates(dates).await?;

        // Idempotent by construction (I5, P9): grouping from scratch and
        // upserting on `(tenant_id, date, event)` means re-running this for
        // the same dates always converges to the same totals, regardless
        // of how many times it's already run.
        let mut totals: HashMap<(Uuid, NaiveDate, String), i64> = HashMap::new();
        for event in &events {
            let date = event.created_at.date_naive();
            *totals.entry((event.tenant_id, date, event.event.clone())).or_insert(0) += event.units as i64;
        }

        let mut written = 0u64;
        for ((tenant_id, date, event), units) in totals {
            let row = identity_service_core::model::UsageDaily { tenant_id, date, event, units };
            self.usage.upsert_daily(&row).await?;
            written += 1;
        }
        Ok(written)
    }
}
