//! Redis-based rate limiter using a fixed window counter (§4.6: "Per-
//! endpoint-class fixed windows"), grounded on
//! `original_source/manushya/core/rate_limiter.py`'s Redis path
//! (`INCR` then `EXPIRE` on first increment).

use crate::limiter::{RateLimitError, RateLimitResult, RateLimiter};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, error};

#[derive(Clone)]
pub struct RedisRateLimiter {
    connection: Arc<RwLock<ConnectionManager>>,
    key_prefix: String,
}

impl RedisRateLimiter {
    pub async fn new(redis_url: &str) -> Result<Self, RateLimitError> {
        Self::with_prefix(redis_url, "rl").await
    }

    pub async fn with_prefix(redis_url: &str, prefix: &str) -> Result<Self, RateLimitError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| RateLimitError::RedisError(e.to_string()))?;
        let connection =
            ConnectionManager::new(client).await.map_err(|e| RateLimitError::RedisError(e.to_string()))?;
        Ok(Self { connection: Arc::new(RwLock::new(connection)), key_prefix: prefix.to_string() })
    }

    fn now_secs() -> u64 {
        SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_secs()
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check_rate_limit(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateLimitResult, RateLimitError> {
        let full_key = self.build_key(key);
        let reset_at = Self::now_secs() + window.as_secs();
        let mut conn = self.connection.write().await.clone();

        // Atomic fixed-window counter: INCR, and EXPIRE only on the first
        // hit in the window so the window doesn't slide on every request.
        let script = redis::Script::new(
            r#"
            local count = redis.call('INCR', KEYS[1])
            if count == 1 then
                redis.call('EXPIRE', KEYS[1], ARGV[1])
            end
            return count
            "#,
        );

        let count: u32 = script
            .key(&full_key)
            .arg(window.as_secs())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::RedisError(e.to_string()))?;

        if count > max_requests {
            debug!("rate limit exceeded for key {}: {} requests", key, count);
            Ok(RateLimitResult::denied(max_requests, reset_at))
        } else {
            Ok(RateLimitResult::allowed(max_requests, max_requests - count, reset_at))
        }
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        let full_key = self.build_key(key);
        let mut conn = self.connection.write().await.clone();
        conn.del::<_, ()>(&full_key).await.map_err(|e| RateLimitError::RedisError(e.to_string()))?;
        Ok(())
    }

    async fn get_count(&self, key: &str) -> Result<u32, RateLimitError> {
        let full_key = self.build_key(key);
        let mut conn = self.connection.write().await.clone();
        let count: Option<u32> =
            conn.get(&full_key).await.map_err(|e| RateLimitError::RedisError(e.to_string()))?;
        Ok(count.unwrap_or(0))
    }

    async fn get_ttl(&self, key: &str) -> Result<u64, RateLimitError> {
        let full_key = self.build_key(key);
        let mut conn = self.connection.write().await.clone();
        let ttl: i64 = conn.ttl(&full_key).await.map_err(|e| RateLimitError::RedisError(e.to_string()))?;
        Ok(ttl.max(0) as u64)
    }

    async fn is_healthy(&self) -> bool {
        let mut conn = self.connection.write().await.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(response) => response == "PONG",
            Err(e) => {
                error!("redis health check failed: {e}");
                false
            }
        }
    }
}

impl std::fmt::Debug for RedisRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRateLimiter").field("key_prefix", &self.key_prefix).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn fixed_window_denies_after_limit() {
        let redis_url = std::env::var("REDIS_URL").unwrap_or("redis://localhost:6379".to_string());
        let limiter = RedisRateLimiter::new(&redis_url).await.unwrap();
        let key = format!("test:{}", uuid::Uuid::new_v4());
        let window = Duration::from_secs(60);

        for i in 0..3 {
            let result = limiter.check_rate_limit(&key, 3, window).await.unwrap();
            assert!(result.allowed, "request {} should be allowed", i + 1);
        }
        let result = limiter.check_rate_limit(&key, 3, window).await.unwrap();
        assert!(!result.allowed);
        limiter.reset(&key).await.unwrap();
    }
}
