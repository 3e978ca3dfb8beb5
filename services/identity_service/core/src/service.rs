//! Capability interfaces for C3-C10 — the "explicit capability
//! interfaces" §9 asks for in place of inherited framework base classes:
//! `CredentialResolver`, `SessionService` (the spec's `Authorizer`-
//! adjacent session contract), `PolicyEngine`, `MemoryCore`
//! (`MemoryStore`), `EventBus` (`EventPublisher`), `WebhookPipeline`, and
//! `AuditUsage`. Infra provides the `sqlx`/`reqwest`-backed
//! implementations; `api` depends only on these traits.

use crate::model::{
    ApiKey, AuditLog, DeviceInfo, Identity, Memory, Policy, Session, UsageDaily, UsageEvent, Webhook, WebhookDelivery,
};
use crate::policy_eval::EvalContext;
use crate::repository::{MemoryFilters, Paging};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use shared_error::AppError;
use shared_types::{Principal, Scope};
use uuid::Uuid;

/// C3: map a presented bearer credential to a principal. Implementations
/// never consult rate limits or policies (§4.3); composition is the
/// caller's responsibility.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Collapses every failure mode to `Unauthenticated` — internal
    /// diagnostics must not leak (§4.3).
    async fn resolve(&self, credential: &str) -> Result<Principal, AppError>;
}

/// Request metadata captured at session issue, before device-info
/// heuristics turn it into a [`DeviceInfo`].
#[derive(Debug, Clone, Default)]
pub struct SessionRequestMetadata {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

pub struct IssuedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub session: Session,
}

pub struct RefreshedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// C4: issue/refresh/revoke sessions with refresh-token rotation
/// disabled per the resolved Open Question in §9/§4.4.
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn issue(&self, identity: &Identity, metadata: SessionRequestMetadata, ttl_days: i64) -> Result<IssuedSession, AppError>;
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedSession, AppError>;
    async fn revoke(&self, scope: Scope, session_id: Uuid) -> Result<(), AppError>;
    async fn revoke_all(&self, scope: Scope, identity_id: Uuid, except: Option<Uuid>) -> Result<u64, AppError>;
    async fn cleanup(&self) -> Result<u64, AppError>;
}

/// C5: evaluate `(principal, action, resource, context)`, fetching and
/// caching the principal's `(tenant, role)` rule set per spec §4.5 /
/// `shared_auth::PolicyCache`.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// `Ok(())` on allow; `Err(AppError::AccessDenied { .. })` on deny.
    async fn authorize(&self, principal: &Principal, action: &str, resource: &str, ctx: &EvalContext) -> Result<(), AppError>;

    async fn create_policy(&self, policy: &Policy) -> Result<Policy, AppError>;
    async fn update_policy(&self, policy: &Policy) -> Result<Policy, AppError>;
    async fn delete_policy(&self, scope: Scope, id: Uuid) -> Result<(), AppError>;
    async fn bulk_delete(&self, scope: Scope, ids: &[Uuid]) -> Result<u64, AppError>;
    /// `POST /policy/test` (§6): evaluate without requiring a stored policy.
    async fn test(&self, principal: &Principal, action: &str, resource: &str, ctx: &EvalContext) -> Result<crate::model::Effect, AppError>;
}

/// Patch accepted by [`MemoryCore::update`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    pub text: Option<String>,
    pub r#type: Option<String>,
    pub metadata: Option<Value>,
    pub ttl_days: Option<Option<i32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Vector,
    /// The embedding collaborator failed; scores are deterministic
    /// (`0.8` substring hit, `0.3` otherwise) per §4.7 step 4.
    TextFallback,
}

pub struct SearchResult {
    pub memories: Vec<Memory>,
    pub mode: SearchMode,
}

/// C7: CRUD + soft-delete + version + TTL + hybrid search (§4.7).
#[async_trait]
pub trait MemoryCore: Send + Sync {
    async fn create(&self, scope: Scope, identity_id: Uuid, text: String, r#type: String, metadata: Value, ttl_days: Option<i32>) -> Result<Memory, AppError>;
    async fn get(&self, scope: Scope, id: Uuid, include_deleted: bool) -> Result<Memory, AppError>;
    async fn list(&self, scope: Scope, identity_id: Uuid, r#type: Option<String>, paging: Paging) -> Result<Vec<Memory>, AppError>;
    async fn update(&self, scope: Scope, id: Uuid, patch: MemoryPatch) -> Result<Memory, AppError>;
    async fn delete(&self, scope: Scope, id: Uuid, hard: bool) -> Result<(), AppError>;
    async fn search(&self, scope: Scope, identity_id: Uuid, query_text: &str, filters: MemoryFilters, k: u32, min_score: f32) -> Result<SearchResult, AppError>;
    /// `backfill_embeddings` (C11): re-attempt embedding generation for
    /// rows a prior `create`/`update` left with `vector = None`, up to
    /// `batch_size` rows. Returns the count actually backfilled.
    async fn backfill_embeddings(&self, batch_size: u32) -> Result<u64, AppError>;
}

/// C8: write the durable `IdentityEvent` row inside the mutation
/// transaction (synchronous half), then hand off to C9 after commit
/// (asynchronous half) — see §4.8.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, scope: Scope, event_type: &str, identity_id: Option<Uuid>, actor_id: Option<Uuid>, payload: Value) -> Result<(), AppError>;
}

pub struct DeliveryOutcome {
    pub status_code: Option<u16>,
    pub succeeded: bool,
}

/// C9: per-tenant subscription fan-out with signed delivery and
/// bounded exponential-backoff retries (§4.9).
#[async_trait]
pub trait WebhookPipeline: Send + Sync {
    async fn create(&self, webhook: &Webhook) -> Result<Webhook, AppError>;
    async fn list(&self, scope: Scope) -> Result<Vec<Webhook>, AppError>;
    async fn update(&self, webhook: &Webhook) -> Result<Webhook, AppError>;
    async fn delete(&self, scope: Scope, id: Uuid) -> Result<(), AppError>;
    async fn list_deliveries(&self, scope: Scope, webhook_id: Uuid, paging: Paging) -> Result<Vec<WebhookDelivery>, AppError>;
    async fn retry_delivery(&self, scope: Scope, delivery_id: Uuid) -> Result<WebhookDelivery, AppError>;

    /// Fan out one event to every active subscriber, creating a
    /// `WebhookDelivery` row per subscriber and attempting delivery once.
    async fn dispatch(&self, scope: Scope, event_type: &str, payload: Value) -> Result<(), AppError>;
    /// `retry_webhook_deliveries` (C11): re-attempt every `pending`
    /// delivery whose `next_retry_at ≤ now`.
    async fn sweep_retries(&self) -> Result<u64, AppError>;
    /// `cleanup_webhook_deliveries` (C11).
    async fn sweep_terminal(&self, older_than_days: i64) -> Result<u64, AppError>;
}

/// C10: append-only audit records plus per-tenant per-day usage
/// aggregates (§4.10).
#[async_trait]
pub trait AuditUsage: Send + Sync {
    async fn record_audit(&self, entry: AuditLog) -> Result<(), AppError>;
    async fn record_usage(&self, tenant_id: Uuid, api_key_id: Option<Uuid>, identity_id: Option<Uuid>, event: &str, units: i32) -> Result<(), AppError>;
    async fn list_events(&self, scope: Scope, paging: Paging) -> Result<Vec<UsageEvent>, AppError>;
    async fn daily_summary(&self, scope: Scope, from: NaiveDate, to: NaiveDate) -> Result<Vec<UsageDaily>, AppError>;
    /// `aggregate_usage` (C11): idempotent per `(tenant, date, event)` (I5, P9).
    async fn aggregate_usage(&self, dates: &[NaiveDate]) -> Result<u64, AppError>;
}

/// Coarse user-agent sniffing producing the four-field fingerprint,
/// grounded on `original_source/manushya/core/session_service.py`'s
/// `extract_device_info`.
pub fn extract_device_info(user_agent: Option<&str>, ip: Option<&str>) -> DeviceInfo {
    let (platform, browser) = match user_agent {
        Some(ua) => (sniff_platform(ua), sniff_browser(ua)),
        None => (None, None),
    };
    DeviceInfo {
        platform,
        browser,
        ip_address: ip.map(str::to_string),
        user_agent: user_agent.map(str::to_string),
    }
}

fn sniff_platform(ua: &str) -> Option<String> {
    let ua_lower = ua.to_lowercase();
    if ua_lower.contains("windows") {
        Some("windows".to_string())
    } else if ua_lower.contains("mac os") || ua_lower.contains("macintosh") {
        Some("macos".to_string())
    } else if ua_lower.contains("android") {
        Some("android".to_string())
    } else if ua_lower.contains("iphone") || ua_lower.contains("ipad") {
        Some("ios".to_string())
    } else if ua_lower.contains("linux") {
        Some("linux".to_string())
    } else {
        None
    }
}

fn sniff_browser(ua: &str) -> Option<String> {
    let ua_lower = ua.to_lowercase();
    if ua_lower.contains("edg/") {
        Some("edge".to_string())
    } else if ua_lower.contains("chrome/") {
        Some("chrome".to_string())
    } else if ua_lower.contains("firefox/") {
        Some("firefox".to_string())
    } else if ua_lower.contains("safari/") {
        Some("safari".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_desktop_browsers() {
        let info = extract_device_info(
            Some("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36"),
            Some("203.0.113.5"),
        );
        assert_eq!(info.platform.as_deref(), Some("windows"));
        assert_eq!(info.browser.as_deref(), Some("chrome"));
        assert_eq!(info.ip_address.as_deref(), Some("203.0.113.5"));
    }

    #[test]
    fn unknown_user_agent_yields_no_platform_or_browser() {
        let info = extract_device_info(Some("curl/8.4.0"), None);
        assert!(info.platform.is_none());
        assert!(info.browser.is_none());
    }

    #[test]
    fn absent_user_agent_is_all_none() {
        let info = extract_device_info(None, None);
        assert!(info.platform.is_none() && info.browser.is_none() && info.ip_address.is_none());
    }
}
