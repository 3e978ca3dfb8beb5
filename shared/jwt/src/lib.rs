use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_error::AppError;
use uuid::Uuid;

/// Claims carried by an access or refresh token.
///
/// `tenant_id` is `None` for a system-scoped identity (see
/// `shared_types::Scope`); `claims` is the identity's free-form key/value
/// bag, mirrored onto the token so the policy engine's `identity_claims`
/// condition can be evaluated without a store round-trip.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub tenant_id: Option<Uuid>,
    pub role: String,
    #[serde(default)]
    pub claims: Value,
    pub iat: i64,
    pub exp: i64,
    pub token_type: TokenType,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

impl Claims {
    pub fn new_access(
        identity_id: Uuid,
        tenant_id: Option<Uuid>,
        role: String,
        claims: Value,
        ttl_seconds: i64,
    ) -> Self {
        Self::new(identity_id, tenant_id, role, claims, ttl_seconds, TokenType::Access)
    }

    pub fn new_refresh(
        identity_id: Uuid,
        tenant_id: Option<Uuid>,
        role: String,
        claims: Value,
        ttl_seconds: i64,
    ) -> Self {
        Self::new(identity_id, tenant_id, role, claims, ttl_seconds, TokenType::Refresh)
    }

    fn new(
        identity_id: Uuid,
        tenant_id: Option<Uuid>,
        role: String,
        claims: Value,
        ttl_seconds: i64,
        token_type: TokenType,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: identity_id,
            tenant_id,
            role,
            claims,
            iat: now,
            exp: now + ttl_seconds,
            token_type,
        }
    }
}

pub fn encode_jwt(claims: &Claims, secret: &str) -> Result<String, AppError> {
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::new(Algorithm::HS256), claims, &key)
        .map_err(|e| AppError::Internal(format!("failed to encode JWT: {e}")))
}

/// Decode and validate a JWT. Any failure (bad signature, expired,
/// malformed) collapses to `Unauthenticated` per the Credential Resolver
/// contract — diagnostics must not leak.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthenticated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips_identity_and_tenant() {
        let identity_id = Uuid::new_v4();
        let tenant_id = Some(Uuid::new_v4());
        let secret = "test_secret";

        let claims =
            Claims::new_access(identity_id, tenant_id, "admin".to_string(), Value::Null, 3600);
        let token = encode_jwt(&claims, secret).unwrap();

        let decoded = decode_jwt(&token, secret).unwrap();
        assert_eq!(decoded.sub, identity_id);
        assert_eq!(decoded.tenant_id, tenant_id);
        assert_eq!(decoded.role, "admin");
        assert_eq!(decoded.token_type, TokenType::Access);
    }

    #[test]
    fn system_identity_has_no_tenant_in_claims() {
        let claims =
            Claims::new_access(Uuid::new_v4(), None, "system".to_string(), Value::Null, 60);
        let token = encode_jwt(&claims, "s").unwrap();
        let decoded = decode_jwt(&token, "s").unwrap();
        assert!(decoded.tenant_id.is_none());
    }

    #[test]
    fn wrong_secret_is_unauthenticated_not_a_parse_error() {
        let claims =
            Claims::new_access(Uuid::new_v4(), None, "user".to_string(), Value::Null, 3600);
        let token = encode_jwt(&claims, "right").unwrap();
        let err = decode_jwt(&token, "wrong").unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
    }
}
