//! The data model of §3: every row carries `id`, `created_at`, `updated_at`
//! and — except `Tenant` and system-global rows — `tenant_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::collections::HashSet;
use uuid::Uuid;

/// Root of isolation. Deleting a tenant cascades to all tenant-owned rows.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An agent or user. `tenant_id = None` marks a system identity, visible
/// across tenants; every other identity is scoped to exactly one tenant.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Identity {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub external_id: String,
    pub role: String,
    pub claims: sqlx::types::Json<Value>,
    pub is_active: bool,
    pub sso_provider: Option<String>,
    pub sso_external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `key_hash` is one-way; the plaintext secret is returned exactly once,
/// at creation, and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApiKey {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub key_hash: String,
    pub identity_id: Uuid,
    pub scopes: Vec<String>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// `is_active ∧ (expires_at is null or now < expires_at)` (§3).
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map(|exp| now < exp).unwrap_or(true)
    }
}

/// Coarse device metadata captured at session issue (§9 GLOSSARY:
/// Fingerprint), stored as JSONB on the owning `Session`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeviceInfo {
    pub platform: Option<String>,
    pub browser: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub identity_id: Uuid,
    pub refresh_token_hash: String,
    pub device_info: sqlx::types::Json<DeviceInfo>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum InvitationState {
    Pending,
    Accepted,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invitation {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub role: String,
    pub claims: sqlx::types::Json<Value>,
    /// Opaque, unique. Only the hash is persisted; plaintext is returned once.
    pub token_hash: String,
    pub invited_by: Option<Uuid>,
    pub is_accepted: bool,
    pub accepted_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invitation {
    /// Pending / accepted / expired are mutually exclusive (§3).
    pub fn state(&self, now: DateTime<Utc>) -> InvitationState {
        if self.is_accepted {
            InvitationState::Accepted
        } else if now > self.expires_at {
            InvitationState::Expired
        } else {
            InvitationState::Pending
        }
    }
}

/// The rule shape evaluated by [`crate::policy_eval`]; see spec §4.5.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_claims: Option<serde_json::Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_restrictions: Option<TimeRestrictions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_restrictions: Option<IpRestrictions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_conditions: Option<ResourceConditions>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TimeRestrictions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IpRestrictions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_ips: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_ranges: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResourceConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_requirements: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

/// A rule naming which actions/resource it governs and under what
/// conditions; see the rule-dialect literal in spec §4.5.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyRule {
    pub actions: Vec<String>,
    pub resource: String,
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<PolicyConditions>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Policy {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub role: String,
    pub rule: sqlx::types::Json<PolicyRule>,
    pub description: Option<String>,
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Memory {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub identity_id: Uuid,
    pub text: String,
    /// `None` until the embedding job completes, or whenever `text`
    /// changes (I3: text changes invalidate any cached vector).
    pub vector: Option<Vec<f32>>,
    #[sqlx(rename = "memory_type")]
    pub r#type: String,
    pub metadata: sqlx::types::Json<Value>,
    /// Populated on search results only; not a persisted column.
    #[sqlx(skip)]
    pub score: Option<f32>,
    pub version: i32,
    pub ttl_days: Option<i32>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.ttl_days.map(|days| self.created_at + chrono::Duration::days(days as i64))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub event_type: String,
    pub actor_id: Option<Uuid>,
    pub resource_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub before_state: Option<sqlx::types::Json<Value>>,
    pub after_state: Option<sqlx::types::Json<Value>>,
    pub meta: sqlx::types::Json<Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The durable ledger behind the Event Bus (C8); see `KNOWN_EVENT_FAMILIES`
/// in `shared_events` for the catalog this `event_type` is checked against.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IdentityEvent {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub event_type: String,
    pub identity_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub payload: sqlx::types::Json<Value>,
    pub meta: sqlx::types::Json<Value>,
    pub is_delivered: bool,
    pub delivery_attempts: i32,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Webhook {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    pub secret: String,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    /// `events` contains the event type or the wildcard `*` (§4.9).
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.is_active
            && (self.events.iter().any(|e| e == "*") || self.events.iter().any(|e| e == event_type))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub webhook_id: Uuid,
    pub event_type: String,
    pub payload: sqlx::types::Json<Value>,
    pub status: DeliveryStatus,
    pub response_code: Option<i32>,
    pub response_body_snippet: Option<String>,
    pub delivery_attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fallback-path counter for C6 when the cache (C2) is unavailable; see
/// spec §4.6 "Fallback (C2 unavailable)".
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RateLimitRow {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub client_key: String,
    pub endpoint: String,
    pub window_start: DateTime<Utc>,
    pub request_count: i32,
    pub last_request_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageEvent {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub api_key_id: Option<Uuid>,
    pub identity_id: Option<Uuid>,
    pub event: String,
    pub units: i32,
    pub metadata: sqlx::types::Json<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageDaily {
    pub tenant_id: Uuid,
    pub date: chrono::NaiveDate,
    pub event: String,
    pub units: i64,
}

/// Known API-key scope strings, used by validation only — the store
/// persists `scopes` as a plain `Vec<String>` (§3: "set of strings").
pub fn scopes_contains(scopes: &[String], required: &str) -> bool {
    scopes.iter().any(|s| s == required) || scopes.iter().any(|s| s == "*")
}

pub fn as_set(values: &[String]) -> HashSet<&str> {
    values.iter().map(|s| s.as_str()).collect()
}
