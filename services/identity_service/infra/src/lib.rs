//! Identity/authorization/agent-memory control plane infrastructure.
//!
//! Concrete, `sqlx`/`redis`/`reqwest`-backed implementations of every
//! repository trait and capability interface `identity_service_core`
//! declares. `identity_service_api` depends on the trait objects exported
//! here, never on the `Pg*`/`Default*` types directly, so handlers stay
//! swappable against mocks in tests.
//!
//! ## Layout
//!
//! - `repo_*`: one Postgres repository per §3 entity (C1).
//! - `credential_resolver`, `session_service`, `policy_engine`,
//!   `memory_core`, `event_bus`, `webhook_pipeline`, `audit_usage`: the
//!   capability implementations (C3-C10).

pub mod audit_usage;
pub mod credential_resolver;
pub mod event_bus;
pub mod memory_core;
pub mod policy_engine;
pub mod repo_api_key;
pub mod repo_audit;
pub mod repo_identity;
pub mod repo_invitation;
pub mod repo_memory;
pub mod repo_policy;
pub mod repo_rate_limit;
pub mod repo_session;
pub mod repo_usage;
pub mod repo_webhook;
pub mod session_service;
pub mod webhook_pipeline;

pub use audit_usage::DefaultAuditUsage;
pub use credential_resolver::DefaultCredentialResolver;
pub use event_bus::DefaultEventBus;
pub use memory_core::{DefaultMemoryCore, EmbeddingClient, HttpEmbeddingClient};
pub use policy_engine::DefaultPolicyEngine;
pub use repo_api_key::PgApiKeyRepository;
pub use repo_audit::{PgAuditLogRepository, PgIdentityEventRepository};
pub use repo_identity::{PgIdentityRepository, PgTenantRepository};
pub use repo_invitation::PgInvitationRepository;
pub use repo_memory::PgMemoryRepository;
pub use repo_policy::PgPolicyRepository;
pub use repo_rate_limit::PgRateLimitRepository;
pub use repo_session::PgSessionRepository;
pub use repo_usage::PgUsageRepository;
pub use repo_webhook::{PgWebhookDeliveryRepository, PgWebhookRepository};
pub use session_service::DefaultSessionService;
pub use webhook_pipeline::DefaultWebhookPipeline;

use identity_service_core::model::Policy;
use identity_service_core::repository::{
    ApiKeyRepository, AuditLogRepository, IdentityEventRepository, IdentityRepository, InvitationRepository,
    MemoryRepository, PolicyRepository, RateLimitRepository, SessionRepository, TenantRepository, UsageRepository,
    WebhookDeliveryRepository, WebhookRepository,
};
use identity_service_core::service::{AuditUsage, CredentialResolver, EventBus, MemoryCore, PolicyEngine, SessionService, WebhookPipeline};
use shared_auth::PolicyCache;
use shared_config::Config;
use shared_events::webhook::WebhookSender;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Every repository and service implementation the API layer needs,
/// assembled once at startup from a single `PgPool` and [`Config`].
/// Mirrors the teacher's per-service composition root (the module that
/// owns `new(pool, config)` and wires every repository/service together)
/// rather than threading a dozen separate `Arc`s through handler state.
#[derive(Clone)]
pub struct Infra {
    pub tenants: Arc<dyn TenantRepository>,
    pub identities: Arc<dyn IdentityRepository>,
    pub api_keys: Arc<dyn ApiKeyRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub invitations: Arc<dyn InvitationRepository>,
    pub policies: Arc<dyn PolicyRepository>,
    pub memories: Arc<dyn MemoryRepository>,
    pub audit_logs: Arc<dyn AuditLogRepository>,
    pub identity_events: Arc<dyn IdentityEventRepository>,
    pub webhooks: Arc<dyn WebhookRepository>,
    pub webhook_deliveries: Arc<dyn WebhookDeliveryRepository>,
    pub rate_limits: Arc<dyn RateLimitRepository>,
    pub usage: Arc<dyn UsageRepository>,

    pub credential_resolver: Arc<dyn CredentialResolver>,
    pub session_service: Arc<dyn SessionService>,
    pub policy_engine: Arc<dyn PolicyEngine>,
    pub memory_core: Arc<dyn MemoryCore>,
    pub event_bus: Arc<dyn EventBus>,
    pub webhook_pipeline: Arc<dyn WebhookPipeline>,
    pub audit_usage: Arc<dyn AuditUsage>,
}

impl Infra {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        let tenants: Arc<dyn TenantRepository> = Arc::new(PgTenantRepository::new(pool.clone()));
        let identities: Arc<dyn IdentityRepository> = Arc::new(PgIdentityRepository::new(pool.clone()));
        let api_keys: Arc<dyn ApiKeyRepository> = Arc::new(PgApiKeyRepository::new(pool.clone()));
        let sessions: Arc<dyn SessionRepository> = Arc::new(PgSessionRepository::new(pool.clone()));
        let invitations: Arc<dyn InvitationRepository> = Arc::new(PgInvitationRepository::new(pool.clone()));
        let policies: Arc<dyn PolicyRepository> = Arc::new(PgPolicyRepository::new(pool.clone()));
        let memories: Arc<dyn MemoryRepository> = Arc::new(PgMemoryRepository::new(pool.clone()));
        let audit_logs: Arc<dyn AuditLogRepository> = Arc::new(PgAuditLogRepository::new(pool.clone()));
        let identity_events: Arc<dyn IdentityEventRepository> = Arc::new(PgIdentityEventRepository::new(pool.clone()));
        let webhooks: Arc<dyn WebhookRepository> = Arc::new(PgWebhookRepository::new(pool.clone()));
        let webhook_deliveries: Arc<dyn WebhookDeliveryRepository> = Arc::new(PgWebhookDeliveryRepository::new(pool.clone()));
        let rate_limits: Arc<dyn RateLimitRepository> = Arc::new(PgRateLimitRepository::new(pool.clone()));
        let usage: Arc<dyn UsageRepository> = Arc::new(PgUsageRepository::new(pool.clone()));

        let credential_resolver: Arc<dyn CredentialResolver> = Arc::new(DefaultCredentialResolver::new(
            api_keys.clone(),
            identities.clone(),
            config.jwt_secret.clone(),
            config.api_key_prefix.clone(),
        ));
        let session_service: Arc<dyn SessionService> = Arc::new(DefaultSessionService::new(
            sessions.clone(),
            identities.clone(),
            config.jwt_secret.clone(),
            config.jwt_access_ttl_seconds,
        ));
        let policy_cache: Arc<PolicyCache<Arc<Vec<Policy>>>> = Arc::new(PolicyCache::with_defaults());
        let policy_engine: Arc<dyn PolicyEngine> = Arc::new(DefaultPolicyEngine::new(policies.clone(), policy_cache));

        let embeddings: Arc<dyn EmbeddingClient> = Arc::new(HttpEmbeddingClient::new(
            config.embedding_provider_url.clone(),
            config.embedding_provider_api_key.clone(),
            config.vector_dimension,
        ));
        let memory_core: Arc<dyn MemoryCore> = Arc::new(DefaultMemoryCore::new(memories.clone(), embeddings));

        let sender = WebhookSender::new(Duration::from_secs(config.webhook_request_timeout_seconds));
        let webhook_pipeline: Arc<dyn WebhookPipeline> = Arc::new(DefaultWebhookPipeline::new(
            webhooks.clone(),
            webhook_deliveries.clone(),
            sender,
            config.webhook_max_attempts,
            config.webhook_retry_delays_seconds.clone(),
        ));
        let event_bus: Arc<dyn EventBus> = Arc::new(DefaultEventBus::new(identity_events.clone(), webhook_pipeline.clone()));
        let audit_usage: Arc<dyn AuditUsage> = Arc::new(DefaultAuditUsage::new(audit_logs.clone(), usage.clone()));

        Self {
            tenants,
            identities,
            api_keys,
            sessions,
            invitations,
            policies,
            memories,
            audit_logs,
            identity_events,
            webhooks,
            webhook_deliveries,
            rate_limits,
            usage,
            credential_resolver,
            session_service,
            policy_engine,
            memory_core,
            event_bus,
            webhook_pipeline,
            audit_usage,
        }
    }
}
