//! `Principal`/`RequestContext` extraction from a bearer JWT.
//!
//! API-key credential resolution (C3's other path) needs a store lookup
//! and lives in `identity_service_infra`; this extractor covers the
//! self-contained JWT case and is what the infra crate's combined
//! credential-resolution middleware falls back on when no `X-API-Key`
//! header is present.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};
use shared_jwt::{Claims, TokenType};
use shared_types::{Principal, Scope};
use tracing::{debug, warn};

pub trait JwtSecretProvider {
    fn get_jwt_secret(&self) -> &str;
}

/// Extracts a `Principal` from `Authorization: Bearer <access-token>`.
/// Rejects refresh tokens used as access credentials.
pub struct AuthPrincipal(pub Principal);

impl<S> FromRequestParts<S> for AuthPrincipal
where
    S: Send + Sync + JwtSecretProvider,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let token = auth_header.strip_prefix("Bearer ").ok_or(StatusCode::UNAUTHORIZED)?;

        let secret = state.get_jwt_secret();
        let claims: Claims = shared_jwt::decode_jwt(token, secret).map_err(|e| {
            warn!("JWT decode failed: {e}");
            StatusCode::UNAUTHORIZED
        })?;

        if claims.token_type != TokenType::Access {
            warn!("refresh token presented as access credential");
            return Err(StatusCode::UNAUTHORIZED);
        }

        let scope = match claims.tenant_id {
            Some(id) => Scope::Tenant(id),
            None => Scope::System,
        };

        debug!(identity_id = %claims.sub, role = %claims.role, "principal extracted from JWT");

        Ok(AuthPrincipal(Principal {
            identity_id: claims.sub,
            scope,
            role: claims.role,
            claims: claims.claims,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use uuid::Uuid;

    struct TestState(String);
    impl JwtSecretProvider for TestState {
        fn get_jwt_secret(&self) -> &str {
            &self.0
        }
    }

    #[tokio::test]
    async fn missing_header_is_unauthenticated() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        let state = TestState("secret".into());
        let result = AuthPrincipal::from_request_parts(&mut parts, &state).await;
        assert_eq!(result.err(), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn refresh_token_rejected_as_access_credential() {
        let claims =
            Claims::new_refresh(Uuid::new_v4(), None, "agent".to_string(), serde_json::Value::Null, 30);
        let token = shared_jwt::encode_jwt(&claims, "secret").unwrap();
        let (mut parts, _) = Request::builder()
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(())
            .unwrap()
            .into_parts();
        let state = TestState("secret".into());
        let result = AuthPrincipal::from_request_parts(&mut parts, &state).await;
        assert_eq!(result.err(), Some(StatusCode::UNAUTHORIZED));
    }
}
