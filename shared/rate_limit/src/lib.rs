//! Rate Limiter (C6): fixed-window counting per `(principal_key,
//! endpoint_class)`, with a Redis-backed primary and an in-process
//! fallback when no Redis URL is configured.

pub mod config;
pub mod limiter;
pub mod memory_limiter;
pub mod middleware;
pub mod redis_limiter;

pub use config::{effective_limit, role_multiplier, EndpointClass, RateLimitConfig};
pub use limiter::{KeyGenerator, RateLimitError, RateLimitResult, RateLimiter};
pub use memory_limiter::InMemoryRateLimiter;
pub use middleware::{RateLimitExt, RateLimitLayer, RateLimitMiddleware, RateLimitState, SharedRateLimiter};
pub use redis_limiter::RedisRateLimiter;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_end_to_end_allows_then_denies() {
        let config = RateLimitConfig::default();
        let state = RateLimitState::from_config(config, None).await;

        for i in 0..100 {
            let result = state.check(EndpointClass::Identity, "ip:192.168.1.100", "anonymous").await.unwrap();
            assert!(result.allowed, "request {} should be allowed", i + 1);
        }
        let result = state.check(EndpointClass::Identity, "ip:192.168.1.100", "anonymous").await.unwrap();
        assert!(!result.allowed, "101st request should be denied");
    }

    #[tokio::test]
    async fn different_endpoint_classes_are_independent() {
        let config = RateLimitConfig::default();
        let state = RateLimitState::from_config(config, None).await;
        let key = "ip:10.0.0.1";

        for _ in 0..20 {
            state.check(EndpointClass::Invitations, key, "anonymous").await.unwrap();
        }
        assert!(!state.check(EndpointClass::Invitations, key, "anonymous").await.unwrap().allowed);
        assert!(state.check(EndpointClass::Memory, key, "anonymous").await.unwrap().allowed);
    }
}
