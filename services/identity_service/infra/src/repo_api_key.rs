use async_trait::async_trait;
use chrono::{DateTime, Utc};
use identity_service_core::model::ApiKey;
use identity_service_core::repository::ApiKeyRepository;
use shared_error::AppError;
use shared_types::Scope;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgApiKeyRepository {
    pool: PgPool,
}

impl PgApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyRepository for PgApiKeyRepository {
    async fn create(&self, api_key: &ApiKey) -> Result<ApiKey, AppError> {
        let row = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (id, tenant_id, name, key_hash, identity_id, scopes, is_active, expires_at, last_used_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(api_key.id)
        .bind(api_key.tenant_id)
        .bind(&api_key.name)
        .bind(&api_key.key_hash)
        .bind(api_key.identity_id)
        .bind(&api_key.scopes)
        .bind(api_key.is_active)
        .bind(api_key.expires_at)
        .bind(api_key.last_used_at)
        .bind(api_key.created_at)
        .bind(api_key.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError> {
        let row = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key_hash = $1")
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_id(&self, scope: Scope, id: Uuid) -> Result<Option<ApiKey>, AppError> {
        let row = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2")
            .bind(id)
            .bind(scope.tenant_id())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_for_identity(&self, scope: Scope, identity_id: Uuid) -> Result<Vec<ApiKey>, AppError> {
        let rows = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE identity_id = $1 AND tenant_id IS NOT DISTINCT FROM $2 ORDER BY created_at DESC",
        )
        .bind(identity_id)
        .bind(scope.tenant_id())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn touch_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke(&self, scope: Scope, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE api_keys SET is_active = false, updated_at = now() WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2")
            .bind(id)
            .bind(scope.tenant_id())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
