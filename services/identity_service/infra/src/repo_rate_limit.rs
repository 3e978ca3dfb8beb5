use async_trait::async_trait;
use chrono::{DateTime, Utc};
use identity_service_core::model::RateLimitRow;
use identity_service_core::repository::RateLimitRepository;
use shared_error::AppError;
use sqlx::PgPool;
use uuid::Uuid;

/// Fallback-path counter used by C6 when Redis (C2) is unreachable; see
/// `shared_rate_limit`'s in-memory/Redis backends for the primary path.
#[derive(Clone)]
pub struct PgRateLimitRepository {
    pool: PgPool,
}

impl PgRateLimitRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitRepository for PgRateLimitRepository {
    async fn increment_window(
        &self,
        scope: Option<Uuid>,
        client_key: &str,
        endpoint: &str,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RateLimitRow, AppError> {
        let row = sqlx::query_as::<_, RateLimitRow>(
            r#"
            INSERT INTO rate_limits (id, tenant_id, client_key, endpoint, window_start, request_count, last_request_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, 1, $5)
            ON CONFLICT (tenant_id, client_key, endpoint, window_start) DO UPDATE SET
                request_count = rate_limits.request_count + 1,
                last_request_at = EXCLUDED.last_request_at
            RETURNING *
            "#,
        )
        .bind(scope)
        .bind(client_key)
        .bind(endpoint)
        .bind(window_start)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_older_than(&self, older_than: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM rate_limits WHERE window_start < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
