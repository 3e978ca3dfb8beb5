//! Axum middleware for the Rate Limiter (C6): resolves an endpoint class
//! and client key, checks/increments the counter, and attaches
//! `X-RateLimit-*`/`Retry-After` response headers on both the allowed and
//! denied paths (§4.6: "Rate-limit errors never prevent downstream
//! responses from emitting these headers").

use crate::config::{effective_limit, EndpointClass, RateLimitConfig};
use crate::limiter::{RateLimitError, RateLimitResult, RateLimiter};
use crate::memory_limiter::InMemoryRateLimiter;
use crate::redis_limiter::RedisRateLimiter;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};
use tracing::{debug, info, warn};

/// Either backend, selected once at startup by whether `redis_url` is set.
#[derive(Clone)]
pub enum SharedRateLimiter {
    Redis(RedisRateLimiter),
    InMemory(InMemoryRateLimiter),
}

impl SharedRateLimiter {
    pub async fn from_config(config: &RateLimitConfig) -> Self {
        if let Some(redis_url) = &config.redis_url {
            match RedisRateLimiter::new(redis_url).await {
                Ok(limiter) => {
                    info!("rate limiter using redis backend");
                    return Self::Redis(limiter);
                }
                Err(e) => {
                    warn!("failed to connect to redis for rate limiting: {e}. falling back to in-memory.");
                }
            }
        }
        info!("rate limiter using in-memory backend");
        Self::InMemory(InMemoryRateLimiter::new())
    }

    pub async fn check(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateLimitResult, RateLimitError> {
        match self {
            Self::Redis(l) => l.check_rate_limit(key, max_requests, window).await,
            Self::InMemory(l) => l.check_rate_limit(key, max_requests, window).await,
        }
    }

    pub async fn is_healthy(&self) -> bool {
        match self {
            Self::Redis(l) => l.is_healthy().await,
            Self::InMemory(l) => l.is_healthy().await,
        }
    }
}

/// Fired, synchronously and fire-and-forget, whenever a request is denied —
/// `(principal_key, endpoint_class_key)`. Lets a caller publish a
/// `rate_limit.exceeded` event without this crate knowing anything about an
/// event bus; the hook itself is responsible for spawning whatever async
/// work it needs.
pub type ExceededHook = Arc<dyn Fn(String, &'static str) + Send + Sync>;

#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<SharedRateLimiter>,
    pub config: RateLimitConfig,
    pub jwt_secret: Option<String>,
    pub on_exceeded: Option<ExceededHook>,
}

impl RateLimitState {
    pub async fn from_config(config: RateLimitConfig, jwt_secret: Option<String>) -> Self {
        let limiter = SharedRateLimiter::from_config(&config).await;
        Self { limiter: Arc::new(limiter), config, jwt_secret, on_exceeded: None }
    }

    pub fn with_on_exceeded(mut self, hook: ExceededHook) -> Self {
        self.on_exceeded = Some(hook);
        self
    }

    /// `principal_key` is `identity:<uuid>` for an authenticated caller,
    /// `ip:<addr>` otherwise — mirroring the original client-key scheme.
    pub async fn check(
        &self,
        class: EndpointClass,
        principal_key: &str,
        role: &str,
    ) -> Result<RateLimitResult, RateLimitError> {
        let (window_seconds, base_limit) = class.base_limit();
        let limit = effective_limit(base_limit, role);
        let key = format!("{}:{}", class.key_prefix(), principal_key);
        self.limiter.check(&key, limit, Duration::from_secs(window_seconds)).await
    }
}

#[derive(Clone)]
pub struct RateLimitLayer {
    state: RateLimitState,
}

impl RateLimitLayer {
    pub fn new(state: RateLimitState) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware { inner, state: self.state.clone() }
    }
}

#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    state: RateLimitState,
}

impl<S> Service<Request<Body>> for RateLimitMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let state = self.state.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if !state.config.enabled {
                return inner.call(req).await;
            }

            let ip = extract_client_ip(&req, &state.config);
            if state.config.is_trusted_ip(&ip) {
                debug!("trusted IP {ip} bypassing rate limit");
                return inner.call(req).await;
            }

            let class = EndpointClass::from_path(req.uri().path());
            let (principal_key, role) = match principal_from_jwt(&req, state.jwt_secret.as_deref()) {
                Some((id, role)) => (format!("identity:{id}"), role),
                None => (format!("ip:{ip}"), "anonymous".to_string()),
            };

            match state.check(class, &principal_key, &role).await {
                Ok(result) if result.allowed => {
                    let response = inner.call(req).await?;
                    Ok(add_rate_limit_headers(response, &result))
                }
                Ok(result) => {
                    info!(
                        principal_key = %principal_key,
                        class = ?class,
                        limit = result.limit,
                        "rate limit exceeded"
                    );
                    if let Some(hook) = &state.on_exceeded {
                        hook(principal_key.clone(), class.key_prefix());
                    }
                    Ok(rate_limit_exceeded_response(&result))
                }
                Err(e) => {
                    warn!("rate limit check failed: {e}. allowing request (fail open).");
                    inner.call(req).await
                }
            }
        })
    }
}

fn principal_from_jwt<B>(req: &Request<B>, jwt_secret: Option<&str>) -> Option<(uuid::Uuid, String)> {
    let jwt_secret = jwt_secret?;
    let auth_header = req.headers().get(header::AUTHORIZATION)?;
    let token = auth_header.to_str().ok()?.strip_prefix("Bearer ")?;
    match shared_jwt::decode_jwt(token, jwt_secret) {
        Ok(claims) => Some((claims.sub, claims.role)),
        Err(e) => {
            debug!("failed to decode JWT for rate limiting: {e}");
            None
        }
    }
}

/// Only trusts `X-Forwarded-For`/`X-Real-Ip` when `trust_proxy_headers` is
/// set; otherwise always uses the socket's peer address.
fn extract_client_ip<B>(req: &Request<B>, config: &RateLimitConfig) -> String {
    if config.trust_proxy_headers {
        if let Some(xff) = req.headers().get("x-forwarded-for") {
            if let Ok(xff_str) = xff.to_str() {
                let ips: Vec<&str> = xff_str.split(',').map(|s| s.trim()).collect();
                if !ips.is_empty() {
                    let index = ips.len().saturating_sub(config.proxy_count as usize + 1);
                    let ip = ips.get(index).unwrap_or(&ips[0]).trim();
                    if !ip.is_empty() {
                        return ip.to_string();
                    }
                }
            }
        }
        if let Some(real_ip) = req.headers().get("x-real-ip") {
            if let Ok(ip) = real_ip.to_str() {
                let ip = ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    if let Some(connect_info) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return connect_info.0.ip().to_string();
    }

    "unknown".to_string()
}

fn add_rate_limit_headers<B>(mut response: Response<B>, result: &RateLimitResult) -> Response<B> {
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&result.limit.to_string()) {
        headers.insert("x-ratelimit-limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&result.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&result.reset_at.to_string()) {
        headers.insert("x-ratelimit-reset", v);
    }
    response
}

fn rate_limit_exceeded_response(result: &RateLimitResult) -> Response<Body> {
    let body = serde_json::json!({
        "error": "rate_limited",
        "message": "too many requests",
        "retry_after_seconds": result.retry_after,
    });

    let mut response = Response::builder()
        .status(StatusCode::TOO_MANY_REQUESTS)
        .header(header::CONTENT_TYPE, "application/json")
        .header("retry-after", result.retry_after.to_string())
        .body(Body::from(body.to_string()))
        .expect("static rate-limit response body is always valid");

    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&result.limit.to_string()) {
        headers.insert("x-ratelimit-limit", v);
    }
    headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
    if let Ok(v) = HeaderValue::from_str(&result.reset_at.to_string()) {
        headers.insert("x-ratelimit-reset", v);
    }
    response
}

pub trait RateLimitExt {
    fn rate_limit(self, state: RateLimitState) -> Self;
}

impl<S> RateLimitExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn rate_limit(self, state: RateLimitState) -> Self {
        self.layer(RateLimitLayer::new(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shared_limiter_in_memory_allows_under_limit() {
        let config = RateLimitConfig::default();
        let state = RateLimitState::from_config(config, None).await;

        let result = state.check(EndpointClass::Default, "ip:127.0.0.1", "anonymous").await.unwrap();
        assert!(result.allowed);
        assert_eq!(result.limit, 100);
    }

    #[tokio::test]
    async fn admin_role_gets_double_the_base_limit() {
        let config = RateLimitConfig::default();
        let state = RateLimitState::from_config(config, None).await;

        let result = state.check(EndpointClass::Policy, "identity:abc", "admin").await.unwrap();
        assert_eq!(result.limit, 100); // base 50 * 2
    }
}
