//! Event envelope and catalog for the identity/memory control plane's
//! `IdentityEvent` ledger (C8) and its webhook fan-out (C9).

use serde::{Deserialize, Serialize};

/// Families a `memory.created`-shaped event type is expected to fall under.
/// Not an exhaustive whitelist: §4.8 accepts unknown types (logged, flagged
/// non-standard) rather than rejecting them, so this only powers the
/// `is_known` flag attached to a stored event, never a validation gate.
pub const KNOWN_EVENT_FAMILIES: &[&str] = &[
    "identity",
    "memory",
    "policy",
    "api_key",
    "invitation",
    "session",
    "rate_limit",
];

/// Whether `event_type` falls into one of the known families (`family.verb`).
/// Webhook *subscriptions* reject anything outside the full catalog (see
/// `SUPPORTED_WEBHOOK_EVENTS`); this looser check is for the event ledger,
/// which must accept and flag, not reject.
pub fn is_known_event_family(event_type: &str) -> bool {
    match event_type.split_once('.') {
        Some((family, _)) => KNOWN_EVENT_FAMILIES.contains(&family),
        None => false,
    }
}

/// The exact event types a webhook subscription may list. Narrower than
/// [`KNOWN_EVENT_FAMILIES`]: creating a subscription for `identity.made_up`
/// is rejected even though an *event* of that type would merely be flagged.
pub const SUPPORTED_WEBHOOK_EVENTS: &[&str] = &[
    "identity.created",
    "identity.updated",
    "identity.deleted",
    "memory.created",
    "memory.updated",
    "memory.deleted",
    "policy.created",
    "policy.updated",
    "policy.deleted",
    "api_key.created",
    "api_key.revoked",
    "invitation.sent",
    "invitation.accepted",
    "session.created",
    "session.revoked",
    "rate_limit.exceeded",
];

/// Envelope persisted in `IdentityEvent.payload` and handed to the webhook
/// pipeline. `version` lets consumers detect a future payload-shape change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_type: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub data: T,
}

impl<T> EventEnvelope<T> {
    pub fn new(event_type: impl Into<String>, data: T) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: chrono::Utc::now(),
            version: "1.0".to_string(),
            data,
        }
    }
}
