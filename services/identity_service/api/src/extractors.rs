use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use shared_error::AppError;
use shared_types::Principal;
use std::net::SocketAddr;

use crate::state::AppState;

/// Extract client IP address from request.
///
/// Tries in order:
/// 1. X-Forwarded-For header (if behind proxy)
/// 2. X-Real-IP header
/// 3. ConnectInfo socket address
pub fn extract_client_ip(headers: &HeaderMap, connect_info: Option<ConnectInfo<SocketAddr>>) -> Option<String> {
    if let Some(forwarded_for) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded_for.to_str() {
            // X-Forwarded-For can be comma-separated: "client, proxy1, proxy2"
            if let Some(client_ip) = value.split(',').next() {
                return Some(client_ip.trim().to_string());
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            return Some(value.to_string());
        }
    }

    connect_info.map(|info| info.0.ip().to_string())
}

/// Extract User-Agent from request headers.
pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers.get("user-agent").and_then(|value| value.to_str().ok()).map(|s| s.to_string())
}

/// Client metadata (IP and User-Agent) usable directly as a handler parameter.
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let connect_info = ConnectInfo::<SocketAddr>::from_request_parts(parts, state).await.ok();
        let ip_address = extract_client_ip(&parts.headers, connect_info);
        let user_agent = extract_user_agent(&parts.headers);
        Ok(ClientInfo { ip_address, user_agent })
    }
}

/// Resolves `Authorization: Bearer <token-or-api-key>` through the
/// Credential Resolver (C3), covering both the JWT and the `mk_`-prefixed
/// API-key path — unlike `shared_auth::AuthPrincipal`, which only handles
/// the self-contained JWT case. Rejection is `AppError::Unauthenticated`
/// rather than a bare `StatusCode`, so the body matches every other
/// handler's `{error, details}` shape.
pub struct CurrentPrincipal(pub Principal);

impl FromRequestParts<AppState> for CurrentPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let credential = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthenticated)?;

        let principal = state.infra.credential_resolver.resolve(credential).await?;
        Ok(CurrentPrincipal(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_extract_ip_from_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1, 198.51.100.1"));

        let ip = extract_client_ip(&headers, None);
        assert_eq!(ip, Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_ip_from_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));

        let ip = extract_client_ip(&headers, None);
        assert_eq!(ip, Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_ip_from_connect_info() {
        let headers = HeaderMap::new();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);
        let connect_info = Some(ConnectInfo(addr));

        let ip = extract_client_ip(&headers, connect_info);
        assert_eq!(ip, Some("127.0.0.1".to_string()));
    }

    #[test]
    fn test_x_forwarded_for_priority() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.1"));

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8080);
        let connect_info = Some(ConnectInfo(addr));

        let ip = extract_client_ip(&headers, connect_info);
        assert_eq!(ip, Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_user_agent() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0 (Windows NT 10.0; Win64; x64)"));

        let ua = extract_user_agent(&headers);
        assert_eq!(ua, Some("Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string()));
    }

    #[test]
    fn test_extract_user_agent_missing() {
        let headers = HeaderMap::new();
        let ua = extract_user_agent(&headers);
        assert_eq!(ua, None);
    }
}
