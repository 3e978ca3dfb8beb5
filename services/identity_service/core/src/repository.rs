//! The Store (C1): one repository trait per entity in §3. Every method
//! that reads or writes a tenant-scoped row takes an explicit
//! [`shared_types::Scope`] — there is no ambient "current tenant"; callers
//! compose tenant filtering themselves so I1 (tenant isolation) can be
//! verified at the trait boundary rather than trusted to SQL discipline
//! scattered across call sites.

use crate::model::{
    ApiKey, AuditLog, Identity, IdentityEvent, Invitation, Memory, Policy, RateLimitRow, Session, Tenant, UsageDaily,
    UsageEvent, Webhook, WebhookDelivery,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_error::AppError;
use shared_types::Scope;
use uuid::Uuid;

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn create(&self, tenant: &Tenant) -> Result<Tenant, AppError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, AppError>;
}

#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_by_external_id(&self, scope: Scope, external_id: &str) -> Result<Option<Identity>, AppError>;
    async fn find_by_id(&self, scope: Scope, id: Uuid) -> Result<Option<Identity>, AppError>;
    async fn find_by_sso(&self, provider: &str, external_id: &str) -> Result<Option<Identity>, AppError>;
    /// Create-or-update-by-`external_id` semantics (§6: `POST /identity`).
    async fn upsert_by_external_id(&self, identity: &Identity) -> Result<Identity, AppError>;
    async fn update(&self, identity: &Identity) -> Result<Identity, AppError>;
    async fn deactivate(&self, scope: Scope, id: Uuid) -> Result<(), AppError>;
    async fn delete(&self, scope: Scope, id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    async fn create(&self, api_key: &ApiKey) -> Result<ApiKey, AppError>;
    async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError>;
    async fn find_by_id(&self, scope: Scope, id: Uuid) -> Result<Option<ApiKey>, AppError>;
    async fn list_for_identity(&self, scope: Scope, identity_id: Uuid) -> Result<Vec<ApiKey>, AppError>;
    async fn touch_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;
    async fn revoke(&self, scope: Scope, id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session, AppError>;
    async fn find_by_refresh_hash(&self, refresh_token_hash: &str) -> Result<Option<Session>, AppError>;
    async fn find_by_id(&self, scope: Scope, id: Uuid) -> Result<Option<Session>, AppError>;
    async fn list_for_identity(&self, scope: Scope, identity_id: Uuid) -> Result<Vec<Session>, AppError>;
    async fn touch_last_used(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;
    async fn revoke(&self, scope: Scope, id: Uuid) -> Result<(), AppError>;
    async fn revoke_all_for_identity(&self, scope: Scope, identity_id: Uuid, except: Option<Uuid>) -> Result<u64, AppError>;
    /// `Session.is_active := false where expires_at < now` (`cleanup_sessions`, C11).
    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait InvitationRepository: Send + Sync {
    async fn create(&self, invitation: &Invitation) -> Result<Invitation, AppError>;
    async fn find_by_id(&self, scope: Scope, id: Uuid) -> Result<Option<Invitation>, AppError>;
    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Invitation>, AppError>;
    async fn list_for_tenant(&self, scope: Scope) -> Result<Vec<Invitation>, AppError>;
    async fn mark_accepted(&self, scope: Scope, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;
    async fn delete(&self, scope: Scope, id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn create(&self, policy: &Policy) -> Result<Policy, AppError>;
    async fn find_by_id(&self, scope: Scope, id: Uuid) -> Result<Option<Policy>, AppError>;
    /// All active policies for `(tenant_of(principal), role)`, the fetch
    /// in §4.5 step 1. Scope is restricted to the caller's own tenant
    /// (§9 Open Question: global-vs-tenant policies).
    async fn find_active_for_role(&self, scope: Scope, role: &str) -> Result<Vec<Policy>, AppError>;
    async fn list_for_tenant(&self, scope: Scope) -> Result<Vec<Policy>, AppError>;
    async fn update(&self, policy: &Policy) -> Result<Policy, AppError>;
    async fn delete(&self, scope: Scope, id: Uuid) -> Result<(), AppError>;
    async fn bulk_delete(&self, scope: Scope, ids: &[Uuid]) -> Result<u64, AppError>;
}

/// Filters accepted by [`MemoryRepository::list`] and
/// [`MemoryRepository::search`] (§4.7).
#[derive(Debug, Clone, Default)]
pub struct MemoryFilters {
    pub r#type: Option<String>,
    pub metadata_requirements: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Paging {
    pub limit: i64,
    pub offset: i64,
}

#[async_trait]
pub trait MemoryRepository: Send + Sync {
    async fn create(&self, memory: &Memory) -> Result<Memory, AppError>;
    async fn find_by_id(&self, scope: Scope, id: Uuid, include_deleted: bool) -> Result<Option<Memory>, AppError>;
    async fn list(&self, scope: Scope, identity_id: Uuid, filters: &MemoryFilters, paging: Paging) -> Result<Vec<Memory>, AppError>;
    /// Full replacement of the mutable fields; callers increment
    /// `version` themselves so the policy of "when does version bump"
    /// stays in the service layer, not the store (I3). `scope` is
    /// re-asserted in the `WHERE` clause the same way every other query in
    /// this trait does, rather than trusted from `memory.tenant_id` alone.
    async fn update(&self, scope: Scope, memory: &Memory) -> Result<Memory, AppError>;
    async fn soft_delete(&self, scope: Scope, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;
    async fn hard_delete(&self, scope: Scope, id: Uuid) -> Result<(), AppError>;
    /// Cosine-similarity top-k against the HNSW index (§4.1), restricted
    /// to `(tenant, identity, not is_deleted, type? match)`.
    async fn search_by_vector(
        &self,
        scope: Scope,
        identity_id: Uuid,
        query_vector: &[f32],
        filters: &MemoryFilters,
        k: u32,
    ) -> Result<Vec<Memory>, AppError>;
    /// `ILIKE` substring fallback used when the embedding collaborator
    /// fails (§4.7 Search step 4).
    async fn search_by_text(
        &self,
        scope: Scope,
        identity_id: Uuid,
        query_text: &str,
        filters: &MemoryFilters,
        k: u32,
    ) -> Result<Vec<Memory>, AppError>;
    /// Non-deleted memories with a null vector, for `backfill_embeddings` (C11).
    async fn list_missing_vector(&self, batch_size: u32) -> Result<Vec<Memory>, AppError>;
    /// Hard-delete memories whose TTL has elapsed (`cleanup_memories`, C11).
    async fn hard_delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// Intended to be called inside the same transaction as the mutation
    /// it records (I4); the trait itself is transaction-agnostic, the
    /// infra implementation accepts a shared connection/transaction
    /// handle via its constructor rather than a parameter here, matching
    /// the teacher's repository pattern of one repository per
    /// `PgPool`/`Transaction` lifetime.
    async fn append(&self, entry: &AuditLog) -> Result<AuditLog, AppError>;
    async fn list_for_tenant(&self, scope: Scope, paging: Paging) -> Result<Vec<AuditLog>, AppError>;
}

#[async_trait]
pub trait IdentityEventRepository: Send + Sync {
    async fn append(&self, event: &IdentityEvent) -> Result<IdentityEvent, AppError>;
    async fn mark_delivered(&self, id: Uuid) -> Result<(), AppError>;
    async fn increment_delivery_attempts(&self, id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn create(&self, webhook: &Webhook) -> Result<Webhook, AppError>;
    async fn find_by_id(&self, scope: Scope, id: Uuid) -> Result<Option<Webhook>, AppError>;
    async fn list_for_tenant(&self, scope: Scope) -> Result<Vec<Webhook>, AppError>;
    /// Active webhooks (tenant match or tenant-null/system) subscribed to
    /// `event_type` or `*` (§4.9 "Subscription resolution").
    async fn find_subscribers(&self, scope: Scope, event_type: &str) -> Result<Vec<Webhook>, AppError>;
    async fn update(&self, webhook: &Webhook) -> Result<Webhook, AppError>;
    async fn delete(&self, scope: Scope, id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait WebhookDeliveryRepository: Send + Sync {
    async fn create(&self, delivery: &WebhookDelivery) -> Result<WebhookDelivery, AppError>;
    async fn find_by_id(&self, scope: Scope, id: Uuid) -> Result<Option<WebhookDelivery>, AppError>;
    async fn list_for_webhook(&self, scope: Scope, webhook_id: Uuid, paging: Paging) -> Result<Vec<WebhookDelivery>, AppError>;
    async fn update(&self, delivery: &WebhookDelivery) -> Result<WebhookDelivery, AppError>;
    /// `pending` rows with `next_retry_at ≤ now` (`retry_webhook_deliveries`, C11/§4.9).
    async fn list_due_for_retry(&self, now: DateTime<Utc>, batch_size: u32) -> Result<Vec<WebhookDelivery>, AppError>;
    /// `delivered`/`failed` rows older than `older_than` (`cleanup_webhook_deliveries`, C11).
    async fn delete_terminal_older_than(&self, older_than: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait RateLimitRepository: Send + Sync {
    /// Fallback-path counter when C2 is unavailable (§4.6 Fallback):
    /// increment-or-create the row for `(client_key, endpoint,
    /// window_start ≥ now-window)`, returning the post-increment count.
    async fn increment_window(
        &self,
        scope: Option<uuid::Uuid>,
        client_key: &str,
        endpoint: &str,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RateLimitRow, AppError>;
    /// `cleanup_rate_limits` (C11): drop rows with `window_start < now - 24h`.
    async fn delete_older_than(&self, older_than: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait UsageRepository: Send + Sync {
    async fn record_event(&self, event: &UsageEvent) -> Result<UsageEvent, AppError>;
    async fn list_events(&self, scope: Scope, paging: Paging) -> Result<Vec<UsageEvent>, AppError>;
    /// Raw events for `date` and the previous day (`aggregate_usage`'s input window, C11).
    async fn list_events_for_dates(&self, dates: &[chrono::NaiveDate]) -> Result<Vec<UsageEvent>, AppError>;
    /// Idempotent upsert on the unique `(tenant_id, date, event)` key (I5, P9).
    async fn upsert_daily(&self, row: &UsageDaily) -> Result<UsageDaily, AppError>;
    async fn summary(&self, scope: Scope, from: chrono::NaiveDate, to: chrono::NaiveDate) -> Result<Vec<UsageDaily>, AppError>;
}
