//! C4: issue/refresh/revoke sessions. Grounded on
//! `original_source/manushya/core/session_service.py`: refresh tokens are
//! `rt_`-prefixed opaque secrets, only their SHA-256 hash is ever
//! persisted, and refresh does not rotate the refresh token (§9 Open
//! Question, resolved: one refresh token lives for the whole session; only
//! the access token is reissued on `/sessions/refresh`).

use async_trait::async_trait;
use chrono::Utc;
use identity_service_core::model::{DeviceInfo, Identity, Session};
use identity_service_core::repository::{IdentityRepository, SessionRepository};
use identity_service_core::service::{extract_device_info, IssuedSession, RefreshedSession, SessionRequestMetadata, SessionService};
use rand::RngCore;
use sha2::{Digest, Sha256};
use shared_error::AppError;
use shared_jwt::Claims;
use shared_types::Scope;
use std::sync::Arc;
use uuid::Uuid;

pub struct DefaultSessionService {
    sessions: Arc<dyn SessionRepository>,
    identities: Arc<dyn IdentityRepository>,
    jwt_secret: String,
    access_ttl_seconds: i64,
}

impl DefaultSessionService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        identities: Arc<dyn IdentityRepository>,
        jwt_secret: String,
        access_ttl_seconds: i64,
    ) -> Self {
        Self { sessions, identities, jwt_secret, access_ttl_seconds }
    }
}

/// `rt_` + 32 random bytes, hex-encoded. Hex rather than base64 so this
/// crate doesn't need a dedicated base64 dependency for one opaque token.
fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("rt_{}", hex::encode(bytes))
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn mint_access_token(identity: &Identity, jwt_secret: &str, ttl_seconds: i64) -> Result<String, AppError> {
    let claims = Claims::new_access(identity.id, identity.tenant_id, identity.role.clone(), identity.claims.0.clone(), ttl_seconds);
    Ok(shared_jwt::encode_jwt(&claims, jwt_secret)?)
}

#[async_trait]
impl SessionService for DefaultSessionService {
    async fn issue(&self, identity: &Identity, metadata: SessionRequestMetadata, ttl_days: i64) -> Result<IssuedSession, AppError> {
        let now = Utc::now();
        let refresh_token = generate_refresh_token();
        let device_info: DeviceInfo = extract_device_info(metadata.user_agent.as_deref(), metadata.ip.as_deref());

        let session = Session {
            id: Uuid::new_v4(),
            tenant_id: identity.tenant_id,
            identity_id: identity.id,
            refresh_token_hash: hash_token(&refresh_token),
            device_info: sqlx::types::Json(device_info),
            ip: metadata.ip.clone(),
            user_agent: metadata.user_agent.clone(),
            is_active: true,
            expires_at: now + chrono::Duration::days(ttl_days),
            last_used_at: now,
            created_at: now,
            updated_at: now,
        };
        let stored = self.sessions.create(&session).await?;
        let access_token = mint_access_token(identity, &self.jwt_secret, self.access_ttl_seconds)?;

        Ok(IssuedSession {
            access_token,
            refresh_token,
            expires_in: self.access_ttl_seconds,
            session: stored,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedSession, AppError> {
        let hash = hash_token(refresh_token);
        let session = self.sessions.find_by_refresh_hash(&hash).await?.ok_or(AppError::Unauthenticated)?;

        if !session.is_valid(Utc::now()) {
            return Err(AppError::Unauthenticated);
        }

        // Re-fetch the identity rather than trusting the session row for
        // role/claims: a role change or deactivation since the session was
        // issued must take effect on the very next refresh.
        let scope = session.tenant_id.map(Scope::Tenant).unwrap_or(Scope::System);
        let identity = self
            .identities
            .find_by_id(scope, session.identity_id)
            .await?
            .ok_or(AppError::Unauthenticated)?;
        if !identity.is_active {
            return Err(AppError::Unauthenticated);
        }

        self.sessions.touch_last_used(session.id, Utc::now()).await?;
        let access_token = mint_access_token(&identity, &self.jwt_secret, self.access_ttl_seconds)?;

        // Refresh token rotation is disabled (§9 Open Question): the same
        // opaque secret backs the session until it is explicitly revoked
        // or expires, so the caller doesn't need to persist a new one.
        Ok(RefreshedSession {
            access_token,
            refresh_token: refresh_token.to_string(),
            expires_in: self.access_ttl_seconds,
        })
    }

    async fn revoke(&self, scope: Scope, session_id: Uuid) -> Result<(), AppError> {
        self.sessions.revoke(scope, session_id).await
    }

    async fn revoke_all(&self, scope: Scope, identity_id: Uuid, except: Option<Uuid>) -> Result<u64, AppError> {
        self.sessions.revoke_all_for_identity(scope, identity_id, except).await
    }

    async fn cleanup(&self) -> Result<u64, AppError> {
        self.sessions.deactivate_expired(Utc::now()).await
    }
}
