//! In-process fixed-window rate limiter: the single-instance fallback used
//! when `redis_url` is unset, mirroring the same fixed-window semantics as
//! [`crate::redis_limiter::RedisRateLimiter`] so switching backends never
//! changes observable behavior.

use crate::limiter::{RateLimitError, RateLimitResult, RateLimiter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    resets_at: u64,
}

#[derive(Debug)]
pub struct InMemoryRateLimiter {
    store: Arc<RwLock<HashMap<String, Window>>>,
    max_entries: usize,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self { store: Arc::new(RwLock::new(HashMap::new())), max_entries: 10_000 }
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self { store: Arc::new(RwLock::new(HashMap::new())), max_entries }
    }

    fn now_secs() -> u64 {
        SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_secs()
    }

    async fn evict_expired_if_over_capacity(&self) {
        let mut store = self.store.write().await;
        if store.len() > self.max_entries {
            let now = Self::now_secs();
            store.retain(|_, w| w.resets_at > now);
        }
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check_rate_limit(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateLimitResult, RateLimitError> {
        self.evict_expired_if_over_capacity().await;
        let now = Self::now_secs();
        let mut store = self.store.write().await;

        let entry = store.entry(key.to_string()).or_insert(Window { count: 0, resets_at: now + window.as_secs() });

        if entry.resets_at <= now {
            entry.count = 0;
            entry.resets_at = now + window.as_secs();
        }

        entry.count += 1;

        if entry.count > max_requests {
            Ok(RateLimitResult::denied(max_requests, entry.resets_at))
        } else {
            Ok(RateLimitResult::allowed(max_requests, max_requests - entry.count, entry.resets_at))
        }
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.store.write().await.remove(key);
        Ok(())
    }

    async fn get_count(&self, key: &str) -> Result<u32, RateLimitError> {
        let now = Self::now_secs();
        let store = self.store.read().await;
        Ok(store.get(key).filter(|w| w.resets_at > now).map(|w| w.count).unwrap_or(0))
    }

    async fn get_ttl(&self, key: &str) -> Result<u64, RateLimitError> {
        let now = Self::now_secs();
        let store = self.store.read().await;
        Ok(store.get(key).map(|w| w.resets_at.saturating_sub(now)).unwrap_or(0))
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

impl Clone for InMemoryRateLimiter {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store), max_entries: self.max_entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_limit_then_denies() {
        let limiter = InMemoryRateLimiter::new();
        let key = "test:user:1";
        let window = Duration::from_secs(60);

        for i in 0..3 {
            let result = limiter.check_rate_limit(key, 3, window).await.unwrap();
            assert!(result.allowed, "request {} should be allowed", i + 1);
        }
        let result = limiter.check_rate_limit(key, 3, window).await.unwrap();
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
    }

    #[tokio::test]
    async fn reset_clears_the_window() {
        let limiter = InMemoryRateLimiter::new();
        let window = Duration::from_secs(60);
        for _ in 0..3 {
            limiter.check_rate_limit("k", 3, window).await.unwrap();
        }
        assert!(!limiter.check_rate_limit("k", 3, window).await.unwrap().allowed);
        limiter.reset("k").await.unwrap();
        assert!(limiter.check_rate_limit("k", 3, window).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn independent_keys_do_not_interfere() {
        let limiter = InMemoryRateLimiter::new();
        let window = Duration::from_secs(60);
        for _ in 0..3 {
            limiter.check_rate_limit("key1", 3, window).await.unwrap();
        }
        assert!(limiter.check_rate_limit("key2", 3, window).await.unwrap().allowed);
    }
}
