use async_trait::async_trait;
use chrono::{DateTime, Utc};
use identity_service_core::model::{Webhook, WebhookDelivery};
use identity_service_core::repository::{Paging, WebhookDeliveryRepository, WebhookRepository};
use shared_error::AppError;
use shared_types::Scope;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgWebhookRepository {
    pool: PgPool,
}

impl PgWebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookRepository for PgWebhookRepository {
    async fn create(&self, webhook: &Webhook) -> Result<Webhook, AppError> {
        let row = sqlx::query_as::<_, Webhook>(
            r#"
            INSERT INTO webhooks (id, tenant_id, name, url, events, secret, is_active, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(webhook.id)
        .bind(webhook.tenant_id)
        .bind(&webhook.name)
        .bind(&webhook.url)
        .bind(&webhook.events)
        .bind(&webhook.secret)
        .bind(webhook.is_active)
        .bind(webhook.created_by)
        .bind(webhook.created_at)
        .bind(webhook.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, scope: Scope, id: Uuid) -> Result<Option<Webhook>, AppError> {
        let row = sqlx::query_as::<_, Webhook>("SELECT * FROM webhooks WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2")
            .bind(id)
            .bind(scope.tenant_id())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_for_tenant(&self, scope: Scope) -> Result<Vec<Webhook>, AppError> {
        let rows = sqlx::query_as::<_, Webhook>(
            "SELECT * FROM webhooks WHERE tenant_id IS NOT DISTINCT FROM $1 ORDER BY created_at DESC",
        )
        .bind(scope.tenant_id())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_subscribers(&self, scope: Scope, event_type: &str) -> Result<Vec<Webhook>, AppError> {
        let rows = sqlx::query_as::<_, Webhook>(
            r#"
            SELECT * FROM webhooks
            WHERE tenant_id IS NOT DISTINCT FROM $1
              AND is_active = true
              AND ($2 = ANY(events) OR '*' = ANY(events))
            "#,
        )
        .bind(scope.tenant_id())
        .bind(event_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update(&self, webhook: &Webhook) -> Result<Webhook, AppError> {
        let row = sqlx::query_as::<_, Webhook>(
            r#"
            UPDATE webhooks SET name = $2, url = $3, events = $4, is_active = $5, updated_at = $6
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(webhook.id)
        .bind(&webhook.name)
        .bind(&webhook.url)
        .bind(&webhook.events)
        .bind(webhook.is_active)
        .bind(webhook.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete(&self, scope: Scope, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM webhooks WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2")
            .bind(id)
            .bind(scope.tenant_id())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgWebhookDeliveryRepository {
    pool: PgPool,
}

impl PgWebhookDeliveryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookDeliveryRepository for PgWebhookDeliveryRepository {
    async fn create(&self, delivery: &WebhookDelivery) -> Result<WebhookDelivery, AppError> {
        let row = sqlx::query_as::<_, WebhookDelivery>(
            r#"
            INSERT INTO webhook_deliveries (id, tenant_id, webhook_id, event_type, payload, status, response_code, response_body_snippet, delivery_attempts, next_retry_at, delivered_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.tenant_id)
        .bind(delivery.webhook_id)
        .bind(&delivery.event_type)
        .bind(&delivery.payload)
        .bind(delivery.status)
        .bind(delivery.response_code)
        .bind(&delivery.response_body_snippet)
        .bind(delivery.delivery_attempts)
        .bind(delivery.next_retry_at)
        .bind(delivery.delivered_at)
        .bind(delivery.created_at)
        .bind(delivery.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, scope: Scope, id: Uuid) -> Result<Option<WebhookDelivery>, AppError> {
        let row = sqlx::query_as::<_, WebhookDelivery>(
            "SELECT * FROM webhook_deliveries WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2",
        )
        .bind(id)
        .bind(scope.tenant_id())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_for_webhook(&self, scope: Scope, webhook_id: Uuid, paging: Paging) -> Result<Vec<WebhookDelivery>, AppError> {
        let rows = sqlx::query_as::<_, WebhookDelivery>(
            "SELECT * FROM webhook_deliveries WHERE webhook_id = $1 AND tenant_id IS NOT DISTINCT FROM $2 ORDER BY created_at DESC LIMIT $3 OFFSET $4",
        )
        .bind(webhook_id)
        .bind(scope.tenant_id())
        .bind(paging.limit)
        .bind(paging.offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update(&self, delivery: &WebhookDelivery) -> Result<WebhookDelivery, AppError> {
        let row = sqlx::query_as::<_, WebhookDelivery>(
            r#"
            UPDATE webhook_deliveries SET status = $2, response_code = $3, response_body_snippet = $4, delivery_attempts = $5, next_retry_at = $6, delivered_at = $7, updated_at = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.status)
        .bind(delivery.response_code)
        .bind(&delivery.response_body_snippet)
        .bind(delivery.delivery_attempts)
        .bind(delivery.next_retry_at)
        .bind(delivery.delivered_at)
        .bind(delivery.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_due_for_retry(&self, now: DateTime<Utc>, batch_size: u32) -> Result<Vec<WebhookDelivery>, AppError> {
        let rows = sqlx::query_as::<_, WebhookDelivery>(
            "SELECT * FROM webhook_deliveries WHERE status = 'pending' AND next_retry_at IS NOT NULL AND next_retry_at <= $1 ORDER BY next_retry_at ASC LIMIT $2",
        )
        .bind(now)
        .bind(batch_size as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_terminal_older_than(&self, older_than: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM webhook_deliveries WHERE status IN ('delivered', 'failed') AND created_at < $1",
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
