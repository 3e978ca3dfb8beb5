//! C8: durable event ledger plus asynchronous webhook hand-off (§4.8).
//! The synchronous half (writing the `IdentityEvent` row) and the
//! asynchronous half (fanning out to subscribers) are split exactly as the
//! spec describes; `publish` never blocks the caller on webhook delivery.

use async_trait::async_trait;
use identity_service_core::model::IdentityEvent;
use identity_service_core::repository::IdentityEventRepository;
use identity_service_core::service::{EventBus, WebhookPipeline};
use shared_error::AppError;
use shared_events::is_known_event_family;
use shared_types::Scope;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

pub struct DefaultEventBus {
    events: Arc<dyn IdentityEventRepository>,
    webhooks: Arc<dyn WebhookPipeline>,
}

impl DefaultEventBus {
    pub fn new(events: Arc<dyn IdentityEventRepository>, webhooks: Arc<dyn WebhookPipeline>) -> Self {
        Self { events, webhooks }
    }
}

#[async_trait]
impl EventBus for DefaultEventBus {
    async fn publish(&self, scope: Scope, event_type: &str, identity_id: Option<Uuid>, actor_id: Option<Uuid>, payload: serde_json::Value) -> Result<(), AppError> {
        if !is_known_event_family(event_type) {
            // §4.8: unknown families are accepted and flagged, never rejected.
            warn!(event_type, "event type outside the known family catalog");
        }

        let now = chrono::Utc::now();
        let event = IdentityEvent {
            id: Uuid::new_v4(),
            tenant_id: scope.tenant_id(),
            event_type: event_type.to_string(),
            identity_id,
            actor_id,
            payload: sqlx::types::Json(payload.clone()),
            meta: sqlx::types::Json(serde_json::json!({})),
            is_delivered: false,
            delivery_attempts: 0,
            delivered_at: None,
            created_at: now,
        };
        let stored = self.events.append(&event).await?;

        // Fan-out failures never fail the publish call; the webhook
        // pipeline owns its own retry bookkeeping (C9).
        if let Err(err) = self.webhooks.dispatch(scope, event_type, payload).await {
            warn!(event_id = %stored.id, error = %err, "webhook dispatch failed, will retry via sweep");
        } else {
            let _ = self.events.mark_delivered(stored.id).await;
        }

        Ok(())
    }
}
