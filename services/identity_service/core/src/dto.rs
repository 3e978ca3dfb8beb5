//! Request/response shapes for the HTTP surface of §6. Kept in `core` so
//! `api` handlers and any future transport share one definition, mirroring
//! the teacher's `domains::auth::dto` split.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::model::{Effect, PolicyRule};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResp {
    #[schema(example = "ACCESS_DENIED")]
    pub error: String,
    pub details: String,
    pub request_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResp {
    #[schema(example = "ok")]
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------- identity

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpsertIdentityReq {
    #[validate(length(min = 1, max = 255))]
    pub external_id: String,
    #[validate(length(min = 1, max = 50))]
    pub role: String,
    #[serde(default)]
    pub claims: Value,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IdentityResp {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub external_id: String,
    pub role: String,
    pub claims: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IdentityWithTokenResp {
    pub identity: IdentityResp,
    pub access_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateIdentityReq {
    #[validate(length(min = 1, max = 50))]
    pub role: Option<String>,
    pub claims: Option<Value>,
    pub is_active: Option<bool>,
}

// ----------------------------------------------------------------- session

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RefreshReq {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionTokenResp {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResp {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ----------------------------------------------------------------- api key

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateApiKeyReq {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyResp {
    pub id: Uuid,
    pub name: String,
    pub scopes: Vec<String>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The store only supports revocation, not a general field update (§4.1);
/// `is_active: Some(false)` revokes, `Some(true)`/`None` is a no-op.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateApiKeyReq {
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyCreatedResp {
    pub api_key: ApiKeyResp,
    /// `mk_…` — returned exactly once (§3).
    pub secret_key: String,
}

// --------------------------------------------------------------- invitation

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateInvitationReq {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 50))]
    pub role: String,
    #[serde(default)]
    pub claims: Value,
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvitationResp {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub is_accepted: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvitationCreatedResp {
    pub invitation: InvitationResp,
    /// Opaque token, returned once; the caller builds the invite link.
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AcceptInvitationReq {
    #[validate(length(min = 1, max = 255))]
    pub external_id: String,
}

// ------------------------------------------------------------------ memory

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateMemoryReq {
    #[validate(length(min = 1, max = 10_000))]
    pub text: String,
    #[validate(length(min = 1, max = 100))]
    pub r#type: String,
    #[serde(default)]
    pub metadata: Value,
    pub ttl_days: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateMemoryReq {
    #[validate(length(min = 1, max = 10_000))]
    pub text: Option<String>,
    pub r#type: Option<String>,
    pub metadata: Option<Value>,
    pub ttl_days: Option<Option<i32>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemoryResp {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub text: String,
    pub r#type: String,
    pub metadata: Value,
    pub score: Option<f32>,
    pub version: i32,
    pub ttl_days: Option<i32>,
    pub has_vector: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SearchMemoryReq {
    #[validate(length(min = 1, max = 10_000))]
    pub query: String,
    pub r#type: Option<String>,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

fn default_search_limit() -> u32 {
    10
}

fn default_min_score() -> f32 {
    0.3
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchMemoryResp {
    pub results: Vec<MemoryResp>,
    /// `true` when the embedding collaborator failed and the results
    /// come from the text-match fallback (§4.7 step 4).
    pub fallback: bool,
}

// ------------------------------------------------------------------ policy

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePolicyReq {
    #[validate(length(min = 1, max = 50))]
    pub role: String,
    pub rule: PolicyRule,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdatePolicyReq {
    pub role: Option<String>,
    pub rule: Option<PolicyRule>,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PolicyResp {
    pub id: Uuid,
    pub role: String,
    pub rule: PolicyRule,
    pub description: Option<String>,
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct TestPolicyReq {
    pub action: String,
    pub resource: String,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub resource_memory_type: Option<String>,
    #[serde(default)]
    pub resource_metadata: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TestPolicyResp {
    pub effect: Effect,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct BulkDeletePolicyReq {
    pub ids: Vec<Uuid>,
}

// ----------------------------------------------------------------- webhook

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateWebhookReq {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 1))]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateWebhookReq {
    pub name: Option<String>,
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookResp {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookDeliveryResp {
    pub id: Uuid,
    pub event_type: String,
    pub status: String,
    pub response_code: Option<i32>,
    pub delivery_attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ------------------------------------------------------------------- usage

#[derive(Debug, Clone, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct UsageRangeQuery {
    pub from: chrono::NaiveDate,
    pub to: chrono::NaiveDate,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsageEventResp {
    pub id: Uuid,
    pub event: String,
    pub units: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsageDailyResp {
    pub date: chrono::NaiveDate,
    pub event: String,
    pub units: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsageSummaryResp {
    pub from: chrono::NaiveDate,
    pub to: chrono::NaiveDate,
    pub totals: Vec<UsageDailyResp>,
}
