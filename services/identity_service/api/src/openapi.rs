#[allow(unused_imports)]
use utoipa::OpenApi;

#[allow(unused_imports)]
use crate::handlers::api_keys::{create_api_key, delete_api_key, get_api_key, list_api_keys, test_api_key, update_api_key};
#[allow(unused_imports)]
use crate::handlers::health::{health_check, HealthResp};
#[allow(unused_imports)]
use crate::handlers::identity::{delete_identity, get_identity, get_me, update_identity, upsert_identity};
#[allow(unused_imports)]
use crate::handlers::invitations::{accept_invitation, create_invitation, list_invitations, revoke_invitation};
#[allow(unused_imports)]
use crate::handlers::memory::{create_memory, delete_memory, get_memory, list_memory, search_memory, update_memory, DeleteMemoryQuery, MemoryListQuery};
#[allow(unused_imports)]
use crate::handlers::policy::{bulk_delete_policy, create_policy, delete_policy, get_policy, list_policy, test_policy, update_policy};
#[allow(unused_imports)]
use crate::handlers::sessions::{list_sessions, refresh, revoke_all_sessions, revoke_session};
#[allow(unused_imports)]
use crate::handlers::usage::{aggregate_usage, list_usage_daily, list_usage_events, usage_summary};
#[allow(unused_imports)]
use crate::handlers::webhooks::{create_webhook, delete_webhook, get_webhook, list_webhook_deliveries, list_webhooks, retry_webhook_delivery, update_webhook};

use identity_service_core::dto::{
    AcceptInvitationReq, ApiKeyCreatedResp, ApiKeyResp, BulkDeletePolicyReq, CreateApiKeyReq, CreateInvitationReq, CreateMemoryReq, CreatePolicyReq,
    CreateWebhookReq, ErrorResp, IdentityResp, IdentityWithTokenResp, InvitationCreatedResp, InvitationResp, MemoryResp, PolicyResp, RefreshReq,
    SearchMemoryReq, SearchMemoryResp, SessionResp, SessionTokenResp, TestPolicyReq, TestPolicyResp, UpdateApiKeyReq, UpdateIdentityReq, UpdateMemoryReq,
    UpdatePolicyReq, UpdateWebhookReq, UpsertIdentityReq, UsageDailyResp, UsageEventResp, UsageRangeQuery, UsageSummaryResp, WebhookDeliveryResp,
    WebhookResp,
};

/// Aggregate OpenAPI document for the identity/authorization/agent-memory
/// control plane (§6). `export-spec` writes this to
/// `shared/openapi/identity.yaml`, mirroring the teacher's per-service spec.
#[derive(OpenApi)]
#[openapi(
    paths(
        // health
        crate::handlers::health::health_check,
        // identity
        upsert_identity,
        get_me,
        get_identity,
        update_identity,
        delete_identity,
        // sessions
        refresh,
        list_sessions,
        revoke_all_sessions,
        revoke_session,
        // api keys
        create_api_key,
        list_api_keys,
        get_api_key,
        update_api_key,
        delete_api_key,
        test_api_key,
        // invitations
        create_invitation,
        list_invitations,
        accept_invitation,
        revoke_invitation,
        // memory
        create_memory,
        get_memory,
        list_memory,
        search_memory,
        update_memory,
        delete_memory,
        // policy
        create_policy,
        list_policy,
        get_policy,
        update_policy,
        delete_policy,
        bulk_delete_policy,
        test_policy,
        // webhooks
        create_webhook,
        list_webhooks,
        get_webhook,
        update_webhook,
        delete_webhook,
        list_webhook_deliveries,
        retry_webhook_delivery,
        // usage
        list_usage_events,
        list_usage_daily,
        usage_summary,
        aggregate_usage,
    ),
    components(schemas(
        HealthResp,
        ErrorResp,
        UpsertIdentityReq,
        UpdateIdentityReq,
        IdentityResp,
        IdentityWithTokenResp,
        RefreshReq,
        SessionResp,
        SessionTokenResp,
        CreateApiKeyReq,
        UpdateApiKeyReq,
        ApiKeyResp,
        ApiKeyCreatedResp,
        crate::handlers::api_keys::ApiKeyTestResp,
        crate::handlers::api_keys::ApiKeyTestIdentity,
        CreateInvitationReq,
        AcceptInvitationReq,
        InvitationResp,
        InvitationCreatedResp,
        CreateMemoryReq,
        UpdateMemoryReq,
        SearchMemoryReq,
        SearchMemoryResp,
        MemoryResp,
        MemoryListQuery,
        DeleteMemoryQuery,
        CreatePolicyReq,
        UpdatePolicyReq,
        BulkDeletePolicyReq,
        TestPolicyReq,
        TestPolicyResp,
        PolicyResp,
        CreateWebhookReq,
        UpdateWebhookReq,
        WebhookResp,
        WebhookDeliveryResp,
        UsageRangeQuery,
        UsageEventResp,
        UsageDailyResp,
        UsageSummaryResp,
    )),
    tags(
        (name = "health", description = "Liveness and readiness checks"),
        (name = "identity", description = "Identity lifecycle (§4.1/§4.2)"),
        (name = "sessions", description = "Refresh-token sessions (§4.4)"),
        (name = "api_keys", description = "Machine credentials (§4.1)"),
        (name = "invitations", description = "Tenant invitation flow (§4.1)"),
        (name = "memory", description = "Agent memory CRUD and search (§4.7)"),
        (name = "policy", description = "Policy rule management and evaluation (§4.5)"),
        (name = "webhooks", description = "Event subscriptions and delivery history (§4.9)"),
        (name = "usage", description = "Audit log and usage aggregates (§4.10)"),
    ),
    info(
        title = "Identity Service API",
        version = "0.1.0",
        description = "Multi-tenant identity, authorization, and agent-memory control plane",
        license(name = "MIT"),
    ),
    servers((url = "http://localhost:3000", description = "Local development server")),
)]
pub struct ApiDoc;

/// Export OpenAPI spec to YAML file (only with `--features export-spec`).
#[cfg(feature = "export-spec")]
#[allow(dead_code)]
pub fn export_spec() -> Result<(), Box<dyn std::error::Error>> {
    use std::path::Path;

    let openapi = ApiDoc::openapi();
    let yaml = serde_yaml::to_string(&openapi).map_err(std::io::Error::other)?;

    let path = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/../../../shared/openapi/identity.yaml"));
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, yaml)?;

    eprintln!("OpenAPI spec exported to {:?}", path);
    Ok(())
}
