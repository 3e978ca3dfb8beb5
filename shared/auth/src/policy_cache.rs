//! Per-`(tenant, role)` compiled-policy cache (§4.5: "Compiled rules may be
//! cached per `(tenant, role)`; the cache is invalidated on any policy write
//! for that tenant/role"). Generic over the compiled rule type `T` so this
//! crate doesn't need to depend on the policy domain type defined in
//! `identity_service_core`.
//!
//! Shaped after the Casbin decision cache this replaces: same moka-backed
//! TTL cache, same hit/miss counters, same fire-and-forget write-after-miss
//! pattern — generalized from caching a single bool decision to caching the
//! whole sorted rule set a tenant/role's requests get evaluated against.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

fn cache_key(tenant_id: Option<Uuid>, role: &str) -> String {
    match tenant_id {
        Some(id) => format!("policy:{id}:{role}"),
        None => format!("policy:system:{role}"),
    }
}

/// TTL-bounded cache of a tenant/role's sorted, active policy set.
pub struct PolicyCache<T: Clone + Send + Sync + 'static> {
    cache: Cache<String, T>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> PolicyCache<T> {
    pub fn new(ttl_seconds: u64, max_entries: u64) -> Self {
        let cache =
            Cache::builder().max_capacity(max_entries).time_to_live(Duration::from_secs(ttl_seconds)).build();
        Self { cache, hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    /// TTL is a backstop, not the primary invalidation path: callers must
    /// also call [`PolicyCache::invalidate`] on every policy write so reads
    /// never observe a rule set older than the write that just happened in
    /// the writer's own tenant/role.
    pub fn with_defaults() -> Self {
        Self::new(30, 10_000)
    }

    pub async fn get(&self, tenant_id: Option<Uuid>, role: &str) -> Option<T> {
        let key = cache_key(tenant_id, role);
        match self.cache.get(&key).await {
            Some(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(v)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set(&self, tenant_id: Option<Uuid>, role: &str, rules: T) {
        self.cache.insert(cache_key(tenant_id, role), rules).await;
    }

    pub async fn invalidate(&self, tenant_id: Option<Uuid>, role: &str) {
        self.cache.invalidate(&cache_key(tenant_id, role)).await;
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 { hits as f64 / total as f64 } else { 0.0 };
        CacheStats { hits, misses, hit_rate }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_then_hit_then_invalidate() {
        let cache: PolicyCache<Vec<u32>> = PolicyCache::new(60, 100);
        let tenant = Some(Uuid::new_v4());

        assert!(cache.get(tenant, "agent").await.is_none());
        cache.set(tenant, "agent", vec![1, 2, 3]).await;
        assert_eq!(cache.get(tenant, "agent").await, Some(vec![1, 2, 3]));

        cache.invalidate(tenant, "agent").await;
        assert!(cache.get(tenant, "agent").await.is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test]
    async fn system_and_tenant_scopes_are_distinct_keys() {
        let cache: PolicyCache<Vec<u32>> = PolicyCache::new(60, 100);
        cache.set(None, "admin", vec![9]).await;
        assert!(cache.get(Some(Uuid::new_v4()), "admin").await.is_none());
        assert_eq!(cache.get(None, "admin").await, Some(vec![9]));
    }
}
