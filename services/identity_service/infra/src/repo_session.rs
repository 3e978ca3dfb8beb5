use async_trait::async_trait;
use chrono::{DateTime, Utc};
use identity_service_core::model::Session;
use identity_service_core::repository::SessionRepository;
use shared_error::AppError;
use shared_types::Scope;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session, AppError> {
        let row = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (id, tenant_id, identity_id, refresh_token_hash, device_info, ip, user_agent, is_active, expires_at, last_used_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(session.id)
        .bind(session.tenant_id)
        .bind(session.identity_id)
        .bind(&session.refresh_token_hash)
        .bind(&session.device_info)
        .bind(&session.ip)
        .bind(&session.user_agent)
        .bind(session.is_active)
        .bind(session.expires_at)
        .bind(session.last_used_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_refresh_hash(&self, refresh_token_hash: &str) -> Result<Option<Session>, AppError> {
        let row = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE refresh_token_hash = $1")
            .bind(refresh_token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_id(&self, scope: Scope, id: Uuid) -> Result<Option<Session>, AppError> {
        let row = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2")
            .bind(id)
            .bind(scope.tenant_id())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_for_identity(&self, scope: Scope, identity_id: Uuid) -> Result<Vec<Session>, AppError> {
        let rows = sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE identity_id = $1 AND tenant_id IS NOT DISTINCT FROM $2 ORDER BY created_at DESC",
        )
        .bind(identity_id)
        .bind(scope.tenant_id())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn touch_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE sessions SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke(&self, scope: Scope, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE sessions SET is_active = false, updated_at = now() WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2")
            .bind(id)
            .bind(scope.tenant_id())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke_all_for_identity(&self, scope: Scope, identity_id: Uuid, except: Option<Uuid>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE sessions SET is_active = false, updated_at = now()
             WHERE identity_id = $1 AND tenant_id IS NOT DISTINCT FROM $2 AND is_active = true
               AND ($3::uuid IS NULL OR id != $3)",
        )
        .bind(identity_id)
        .bind(scope.tenant_id())
        .bind(except)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE sessions SET is_active = false, updated_at = now() WHERE expires_at < $1 AND is_active = true")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
