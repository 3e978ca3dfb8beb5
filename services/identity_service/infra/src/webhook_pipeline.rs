//! C9: per-tenant subscription fan-out with signed delivery and bounded
//! exponential-backoff retries (§4.9). Delivery mechanics (signing,
//! canonicalization, the retry-delay table) live in `shared_events`; this
//! module owns subscription resolution and the `WebhookDelivery` row
//! lifecycle.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use identity_service_core::model::{DeliveryStatus, Webhook, WebhookDelivery};
use identity_service_core::repository::{Paging, WebhookDeliveryRepository, WebhookRepository};
use identity_service_core::service::WebhookPipeline;
use shared_error::AppError;
use shared_events::webhook::{canonicalize_payload, next_retry_delay, sign, WebhookSender};
use shared_types::Scope;
use std::sync::Arc;
use uuid::Uuid;

pub struct DefaultWebhookPipeline {
    webhooks: Arc<dyn WebhookRepository>,
    deliveries: Arc<dyn WebhookDeliveryRepository>,
    sender: WebhookSender,
    max_attempts: u32,
    retry_delays_seconds: Vec<u64>,
}

impl DefaultWebhookPipeline {
    pub fn new(
        webhooks: Arc<dyn WebhookRepository>,
        deliveries: Arc<dyn WebhookDeliveryRepository>,
        sender: WebhookSender,
        max_attempts: u32,
        retry_delays_seconds: Vec<u64>,
    ) -> Self {
        Self { webhooks, deliveries, sender, max_attempts, retry_delays_seconds }
    }

    async fn attempt(&self, webhook: &Webhook, mut delivery: WebhookDelivery) -> Result<WebhookDelivery, AppError> {
        let payload_str = canonicalize_payload(&delivery.event_type, Utc::now(), &delivery.payload.0)
            .map_err(|e| AppError::Internal(format!("failed to canonicalize webhook payload: {e}")))?;
        let signature = sign(&payload_str, &webhook.secret);

        let outcome = self.sender.deliver(&webhook.url, &payload_str, &signature, &delivery.event_type, delivery.id).await;

        delivery.delivery_attempts += 1;
        delivery.response_code = outcome.status_code.map(|c| c as i32);
        delivery.response_body_snippet = Some(outcome.response_snippet);

        if outcome.succeeded {
            delivery.status = DeliveryStatus::Delivered;
            delivery.delivered_at = Some(Utc::now());
            delivery.next_retry_at = None;
        } else if delivery.delivery_attempts >= self.max_attempts as i32 {
            delivery.status = DeliveryStatus::Failed;
            delivery.next_retry_at = None;
        } else {
            delivery.status = DeliveryStatus::Pending;
            let delay = next_retry_delay(delivery.delivery_attempts as u32, &self.retry_delays_seconds);
            delivery.next_retry_at = Some(Utc::now() + ChronoDuration::from_std(delay).unwrap_or_default());
        }

        self.deliveries.update(&delivery).await
    }
}

#[async_trait]
impl WebhookPipeline for DefaultWebhookPipeline {
    async fn create(&self, webhook: &Webhook) -> Result<Webhook, AppError> {
        self.webhooks.create(webhook).await
    }

    async fn list(&self, scope: Scope) -> Result<Vec<Webhook>, AppError> {
        self.webhooks.list_for_tenant(scope).await
    }

    async fn update(&self, webhook: &Webhook) -> Result<Webhook, AppError> {
        self.webhooks.update(webhook).await
    }

    async fn delete(&self, scope: Scope, id: Uuid) -> Result<(), AppError> {
        self.webhooks.delete(scope, id).await
    }

    async fn list_deliveries(&self, scope: Scope, webhook_id: Uuid, paging: Paging) -> Result<Vec<WebhookDelivery>, AppError> {
        self.deliveries.list_for_webhook(scope, webhook_id, paging).await
    }

    async fn retry_delivery(&self, scope: Scope, delivery_id: Uuid) -> Result<WebhookDelivery, AppError> {
        let delivery = self
            .deliveries
            .find_by_id(scope, delivery_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("webhook delivery {delivery_id} not found")))?;
        let webhook = self
            .webhooks
            .find_by_id(scope, delivery.webhook_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("webhook {} not found", delivery.webhook_id)))?;
        self.attempt(&webhook, delivery).await
    }

    async fn dispatch(&self, scope: Scope, event_type: &str, payload: serde_json::Value) -> Result<(), AppError> {
        let subscribers = self.webhooks.find_subscribers(scope, event_type).await?;
        let mut last_err = None;

        for webhook in subscribers {
            let now = Utc::now();
            let delivery = WebhookDelivery {
                id: Uuid::new_v4(),
                tenant_id: scope.tenant_id(),
                webhook_id: webhook.id,
                event_type: event_type.to_string(),
                payload: sqlx::types::Json(payload.clone()),
                status: DeliveryStatus::Pending,
                response_code: None,
                response_body_snippet: None,
                delivery_attempts: 0,
                next_retry_at: None,
                delivered_at: None,
                created_at: now,
                updated_at: now,
            };
            let stored = match self.deliveries.create(&delivery).await {
                Ok(d) => d,
                Err(e) => {
                    last_err = Some(e);
                    continue;
                }
            };
            if let Err(e) = self.attempt(&webhook, stored).await {
                last_err = Some(e);
            }
        }

        match last_err {
            // One subscriber's failure never blocks the others; surface the
            // last error only so a caller polling `dispatch`'s return value
            // sees that *something* in the fan-out needs attention.
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn sweep_retries(&self) -> Result<u64, AppError> {
        let due = self.deliveries.list_due_for_retry(Utc::now(), 100).await?;
        let mut retried = 0u64;
        for delivery in due {
            let scope = delivery.tenant_id.map(Scope::Tenant).unwrap_or(Scope::System);
            let Some(webhook) = self.webhooks.find_by_id(scope, delivery.webhook_id).await.ok().flatten() else {
                continue;
            };
            if self.attempt(&webhook, delivery).await.is_ok() {
                retried += 1;
            }
        }
        Ok(retried)
    }

    async fn sweep_terminal(&self, older_than_days: i64) -> Result<u64, AppError> {
        let cutoff = Utc::now() - ChronoDuration::days(older_than_days);
        self.deliveries.delete_terminal_older_than(cutoff).await
    }
}
