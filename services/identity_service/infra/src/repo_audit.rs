use async_trait::async_trait;
use identity_service_core::model::{AuditLog, IdentityEvent};
use identity_service_core::repository::{AuditLogRepository, IdentityEventRepository, Paging};
use shared_error::AppError;
use shared_types::Scope;
use sqlx::PgPool;
use uuid::Uuid;

/// Constructed per-transaction by the caller (I4: an audit row and the
/// mutation it describes commit atomically or not at all), matching the
/// teacher's one-repository-per-connection-lifetime pattern rather than
/// threading a transaction handle through every trait method.
#[derive(Clone)]
pub struct PgAuditLogRepository {
    pool: PgPool,
}

impl PgAuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogRepository for PgAuditLogRepository {
    async fn append(&self, entry: &AuditLog) -> Result<AuditLog, AppError> {
        let row = sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (id, tenant_id, event_type, actor_id, resource_id, resource_type, before_state, after_state, meta, ip, user_agent, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(entry.id)
        .bind(entry.tenant_id)
        .bind(&entry.event_type)
        .bind(entry.actor_id)
        .bind(entry.resource_id)
        .bind(&entry.resource_type)
        .bind(&entry.before_state)
        .bind(&entry.after_state)
        .bind(&entry.meta)
        .bind(&entry.ip)
        .bind(&entry.user_agent)
        .bind(entry.timestamp)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_for_tenant(&self, scope: Scope, paging: Paging) -> Result<Vec<AuditLog>, AppError> {
        let rows = sqlx::query_as::<_, AuditLog>(
            "SELECT * FROM audit_logs WHERE tenant_id IS NOT DISTINCT FROM $1 ORDER BY timestamp DESC LIMIT $2 OFFSET $3",
        )
        .bind(scope.tenant_id())
        .bind(paging.limit)
        .bind(paging.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Clone)]
pub struct PgIdentityEventRepository {
    pool: PgPool,
}

impl PgIdentityEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityEventRepository for PgIdentityEventRepository {
    async fn append(&self, event: &IdentityEvent) -> Result<IdentityEvent, AppError> {
        let row = sqlx::query_as::<_, IdentityEvent>(
            r#"
            INSERT INTO identity_events (id, tenant_id, event_type, identity_id, actor_id, payload, meta, is_delivered, delivery_attempts, delivered_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(event.id)
        .bind(event.tenant_id)
        .bind(&event.event_type)
        .bind(event.identity_id)
        .bind(event.actor_id)
        .bind(&event.payload)
        .bind(&event.meta)
        .bind(event.is_delivered)
        .bind(event.delivery_attempts)
        .bind(event.delivered_at)
        .bind(event.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn mark_delivered(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE identity_events SET is_delivered = true, delivered_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn increment_delivery_attempts(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE identity_events SET delivery_attempts = delivery_attempts + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
