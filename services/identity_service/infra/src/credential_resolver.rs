//! C3: resolve a presented bearer credential — either an `mk_`-prefixed
//! API key or a JWT access token — into a [`Principal`]. Grounded on
//! `original_source/manushya/core/auth.py`'s `get_current_identity`, which
//! branches the same way on the `mk_` prefix before falling through to JWT
//! decode.

use async_trait::async_trait;
use chrono::Utc;
use identity_service_core::repository::{ApiKeyRepository, IdentityRepository};
use identity_service_core::service::CredentialResolver;
use sha2::{Digest, Sha256};
use shared_error::AppError;
use shared_jwt::{Claims, TokenType};
use shared_types::{Principal, Scope};
use std::sync::Arc;

pub struct DefaultCredentialResolver {
    api_keys: Arc<dyn ApiKeyRepository>,
    identities: Arc<dyn IdentityRepository>,
    jwt_secret: String,
    api_key_prefix: String,
}

impl DefaultCredentialResolver {
    pub fn new(
        api_keys: Arc<dyn ApiKeyRepository>,
        identities: Arc<dyn IdentityRepository>,
        jwt_secret: String,
        api_key_prefix: String,
    ) -> Self {
        Self { api_keys, identities, jwt_secret, api_key_prefix }
    }

    async fn resolve_api_key(&self, credential: &str) -> Result<Principal, AppError> {
        let hash = hex::encode(Sha256::digest(credential.as_bytes()));
        let api_key = self
            .api_keys
            .find_by_hash(&hash)
            .await?
            .ok_or_else(|| AppError::Unauthenticated)?;

        if !api_key.is_valid(Utc::now()) {
            return Err(AppError::Unauthenticated);
        }

        let scope = api_key.tenant_id.map(Scope::Tenant).unwrap_or(Scope::System);
        let identity = self
            .identities
            .find_by_id(scope, api_key.identity_id)
            .await?
            .ok_or_else(|| AppError::Unauthenticated)?;

        if !identity.is_active {
            return Err(AppError::Unauthenticated);
        }

        self.api_keys.touch_last_used(api_key.id, Utc::now()).await?;

        Ok(Principal { identity_id: identity.id, scope, role: identity.role, claims: identity.claims.0 })
    }

    fn resolve_jwt(&self, credential: &str) -> Result<Principal, AppError> {
        let claims: Claims = shared_jwt::decode_jwt(credential, &self.jwt_secret)?;
        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthenticated);
        }
        let scope = claims.tenant_id.map(Scope::Tenant).unwrap_or(Scope::System);
        Ok(Principal { identity_id: claims.sub, scope, role: claims.role, claims: claims.claims })
    }
}

#[async_trait]
impl CredentialResolver for DefaultCredentialResolver {
    async fn resolve(&self, credential: &str) -> Result<Principal, AppError> {
        if credential.starts_with(&self.api_key_prefix) {
            self.resolve_api_key(credential).await
        } else {
            self.resolve_jwt(credential)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_jwt_rejects_refresh_token_as_credential() {
        let resolver = DefaultCredentialResolver::new(
            Arc::new(NullApiKeyRepo),
            Arc::new(NullIdentityRepo),
            "secret".into(),
            "mk_".into(),
        );
        let claims = Claims::new_refresh(uuid::Uuid::new_v4(), None, "agent".into(), serde_json::Value::Null, 30);
        let token = shared_jwt::encode_jwt(&claims, "secret").unwrap();
        let result = resolver.resolve_jwt(&token);
        assert!(matches!(result, Err(AppError::Unauthenticated)));
    }

    struct NullApiKeyRepo;
    #[async_trait]
    impl ApiKeyRepository for NullApiKeyRepo {
        async fn create(&self, _: &identity_service_core::model::ApiKey) -> Result<identity_service_core::model::ApiKey, AppError> {
            unimplemented!()
        }
        async fn find_by_hash(&self, _: &str) -> Result<Option<identity_service_core::model::ApiKey>, AppError> {
            Ok(None)
        }
        async fn find_by_id(&self, _: Scope, _: uuid::Uuid) -> Result<Option<identity_service_core::model::ApiKey>, AppError> {
            Ok(None)
        }
        async fn list_for_identity(&self, _: Scope, _: uuid::Uuid) -> Result<Vec<identity_service_core::model::ApiKey>, AppError> {
            Ok(vec![])
        }
        async fn touch_last_used(&self, _: uuid::Uuid, _: chrono::DateTime<Utc>) -> Result<(), AppError> {
            Ok(())
        }
        async fn revoke(&self, _: Scope, _: uuid::Uuid) -> Result<(), AppError> {
            Ok(())
        }
    }

    struct NullIdentityRepo;
    #[async_trait]
    impl IdentityRepository for NullIdentityRepo {
        async fn find_by_external_id(&self, _: Scope, _: &str) -> Result<Option<identity_service_core::model::Identity>, AppError> {
            Ok(None)
        }
        async fn find_by_id(&self, _: Scope, _: uuid::Uuid) -> Result<Option<identity_service_core::model::Identity>, AppError> {
            Ok(None)
        }
        async fn find_by_sso(&self, _: &str, _: &str) -> Result<Option<identity_service_core::model::Identity>, AppError> {
            Ok(None)
        }
        async fn upsert_by_external_id(&self, identity: &identity_service_core::model::Identity) -> Result<identity_service_core::model::Identity, AppError> {
            Ok(identity.clone())
        }
        async fn update(&self, identity: &identity_service_core::model::Identity) -> Result<identity_service_core::model::Identity, AppError> {
            Ok(identity.clone())
        }
        async fn deactivate(&self, _: Scope, _: uuid::Uuid) -> Result<(), AppError> {
            Ok(())
        }
        async fn delete(&self, _: Scope, _: uuid::Uuid) -> Result<(), AppError> {
            Ok(())
        }
    }
}
