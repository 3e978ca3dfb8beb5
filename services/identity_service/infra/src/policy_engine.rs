//! C5: fetch the principal's `(tenant, role)` rule set, cache it, and
//! evaluate with [`identity_service_core::policy_eval::evaluate`].

use async_trait::async_trait;
use identity_service_core::model::{Effect, Policy};
use identity_service_core::policy_eval::{self, EvalContext};
use identity_service_core::repository::PolicyRepository;
use identity_service_core::service::PolicyEngine;
use shared_auth::PolicyCache;
use shared_error::AppError;
use shared_types::{Principal, Scope};
use std::sync::Arc;
use uuid::Uuid;

pub struct DefaultPolicyEngine {
    policies: Arc<dyn PolicyRepository>,
    cache: Arc<PolicyCache<Arc<Vec<Policy>>>>,
}

impl DefaultPolicyEngine {
    pub fn new(policies: Arc<dyn PolicyRepository>, cache: Arc<PolicyCache<Arc<Vec<Policy>>>>) -> Self {
        Self { policies, cache }
    }

    async fn rules_for(&self, scope: Scope, role: &str) -> Result<Arc<Vec<Policy>>, AppError> {
        if let Some(cached) = self.cache.get(scope.tenant_id(), role).await {
            return Ok(cached);
        }
        let rules = Arc::new(self.policies.find_active_for_role(scope, role).await?);
        self.cache.set(scope.tenant_id(), role, rules.clone()).await;
        Ok(rules)
    }

    async fn invalidate(&self, scope: Scope, role: &str) {
        self.cache.invalidate(scope.tenant_id(), role).await;
    }
}

#[async_trait]
impl PolicyEngine for DefaultPolicyEngine {
    async fn authorize(&self, principal: &Principal, action: &str, resource: &str, ctx: &EvalContext) -> Result<(), AppError> {
        let rules = self.rules_for(principal.scope, &principal.role).await?;
        let effect = policy_eval::evaluate(&rules, principal, action, resource, ctx, chrono::Utc::now());
        match effect {
            Effect::Allow => Ok(()),
            Effect::Deny => Err(AppError::AccessDenied { action: action.to_string(), resource: resource.to_string() }),
        }
    }

    async fn create_policy(&self, policy: &Policy) -> Result<Policy, AppError> {
        let created = self.policies.create(policy).await?;
        let scope = created.tenant_id.map(Scope::Tenant).unwrap_or(Scope::System);
        self.invalidate(scope, &created.role).await;
        Ok(created)
    }

    async fn update_policy(&self, policy: &Policy) -> Result<Policy, AppError> {
        let updated = self.policies.update(policy).await?;
        let scope = updated.tenant_id.map(Scope::Tenant).unwrap_or(Scope::System);
        self.invalidate(scope, &updated.role).await;
        Ok(updated)
    }

    async fn delete_policy(&self, scope: Scope, id: Uuid) -> Result<(), AppError> {
        if let Some(policy) = self.policies.find_by_id(scope, id).await? {
            self.policies.delete(scope, id).await?;
            self.invalidate(scope, &policy.role).await;
        }
        Ok(())
    }

    async fn bulk_delete(&self, scope: Scope, ids: &[Uuid]) -> Result<u64, AppError> {
        // Roles affected must be known before the rows disappear, so the
        // right caches get invalidated afterwards.
        let mut roles = std::collections::HashSet::new();
        for policy in self.policies.list_for_tenant(scope).await? {
            if ids.contains(&policy.id) {
                roles.insert(policy.role);
            }
        }
        let deleted = self.policies.bulk_delete(scope, ids).await?;
        for role in roles {
            self.invalidate(scope, &role).await;
        }
        Ok(deleted)
    }

    async fn test(&self, principal: &Principal, action: &str, resource: &str, ctx: &EvalContext) -> Result<Effect, AppError> {
        let rules = self.rules_for(principal.scope, &principal.role).await?;
        Ok(policy_eval::evaluate(&rules, principal, action, resource, ctx, chrono::Utc::now()))
    }
}
