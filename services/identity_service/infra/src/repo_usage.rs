use async_trait::async_trait;
use identity_service_core::model::{UsageDaily, UsageEvent};
use identity_service_core::repository::{Paging, UsageRepository};
use shared_error::AppError;
use shared_types::Scope;
use sqlx::PgPool;

#[derive(Clone)]
pub struct PgUsageRepository {
    pool: PgPool,
}

impl PgUsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepository for PgUsageRepository {
    async fn record_event(&self, event: &UsageEvent) -> Result<UsageEvent, AppError> {
        let row = sqlx::query_as::<_, UsageEvent>(
            r#"
            INSERT INTO usage_events (id, tenant_id, api_key_id, identity_id, event, units, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(event.id)
        .bind(event.tenant_id)
        .bind(event.api_key_id)
        .bind(event.identity_id)
        .bind(&event.event)
        .bind(event.units)
        .bind(&event.metadata)
        .bind(event.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_events(&self, scope: Scope, paging: Paging) -> Result<Vec<UsageEvent>, AppError> {
        let rows = sqlx::query_as::<_, UsageEvent>(
            "SELECT * FROM usage_events WHERE tenant_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(scope.tenant_id())
        .bind(paging.limit)
        .bind(paging.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_events_for_dates(&self, dates: &[chrono::NaiveDate]) -> Result<Vec<UsageEvent>, AppError> {
        let rows = sqlx::query_as::<_, UsageEvent>(
            "SELECT * FROM usage_events WHERE created_at::date = ANY($1)",
        )
        .bind(dates)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert_daily(&self, row: &UsageDaily) -> Result<UsageDaily, AppError> {
        let result = sqlx::query_as::<_, UsageDaily>(
            r#"
            INSERT INTO usage_daily (tenant_id, date, event, units)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, date, event) DO UPDATE SET units = EXCLUDED.units
            RETURNING *
            "#,
        )
        .bind(row.tenant_id)
        .bind(row.date)
        .bind(&row.event)
        .bind(row.units)
        .fetch_one(&self.pool)
        .await?;
        Ok(result)
    }

    async fn summary(&self, scope: Scope, from: chrono::NaiveDate, to: chrono::NaiveDate) -> Result<Vec<UsageDaily>, AppError> {
        let rows = sqlx::query_as::<_, UsageDaily>(
            "SELECT * FROM usage_daily WHERE tenant_id = $1 AND date BETWEEN $2 AND $3 ORDER BY date ASC",
        )
        .bind(scope.tenant_id())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
