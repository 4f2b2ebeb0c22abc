//! The shared cache tier (spec §4.4): an optional distributed cache fronting
//! the Catalogue Store. A read budget bounds how long the normalizer/pricing
//! stages wait on it before falling back to the database, so a slow shared
//! cache degrades latency instead of availability.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use nphies_core::constants::SHARED_CACHE_READ_BUDGET;
use nphies_envelope::ClaimError;

#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, ClaimError>;
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), ClaimError>;
    async fn invalidate(&self, namespace: &str, key: &str) -> Result<(), ClaimError>;
}

/// Bounds any [`SharedCache`] read to [`SHARED_CACHE_READ_BUDGET`]. A timeout
/// is treated as a miss, not an error, so callers always have a DB fallback
/// path regardless of which `SharedCache` is configured.
pub async fn get_with_budget(
    cache: &dyn SharedCache,
    namespace: &str,
    key: &str,
) -> Option<String> {
    match tokio::time::timeout(SHARED_CACHE_READ_BUDGET, cache.get(namespace, key)).await {
        Ok(Ok(value)) => value,
        Ok(Err(_)) | Err(_) => None,
    }
}

/// Used when no distributed cache is configured; every read misses and every
/// write is a no-op, so the normalizer/pricing stages fall straight through
/// to the database without special-casing "no shared cache" at call sites.
pub struct NullSharedCache;

#[async_trait]
impl SharedCache for NullSharedCache {
    async fn get(&self, _namespace: &str, _key: &str) -> Result<Option<String>, ClaimError> {
        Ok(None)
    }

    async fn set(
        &self,
        _namespace: &str,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<(), ClaimError> {
        Ok(())
    }

    async fn invalidate(&self, _namespace: &str, _key: &str) -> Result<(), ClaimError> {
        Ok(())
    }
}

struct TimedValue {
    value: String,
    expires_at: std::time::Instant,
}

/// A single-process stand-in for a real distributed cache (Redis et al.),
/// used in tests and in single-node deployments that don't want an external
/// dependency.
#[derive(Default)]
pub struct InMemorySharedCache {
    entries: Mutex<HashMap<(String, String), TimedValue>>,
}

impl InMemorySharedCache {
    pub fn new() -> Self {
        InMemorySharedCache {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, ClaimError> {
        let guard = self.entries.lock();
        let k = (namespace.to_string(), key.to_string());
        Ok(guard.get(&k).and_then(|tv| {
            if tv.expires_at > std::time::Instant::now() {
                Some(tv.value.clone())
            } else {
                None
            }
        }))
    }

    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), ClaimError> {
        let mut guard = self.entries.lock();
        guard.insert(
            (namespace.to_string(), key.to_string()),
            TimedValue {
                value: value.to_string(),
                expires_at: std::time::Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, namespace: &str, key: &str) -> Result<(), ClaimError> {
        let mut guard = self.entries.lock();
        guard.remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_cache_always_misses() {
        let cache = NullSharedCache;
        assert_eq!(cache.get("sbs_map", "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn in_memory_cache_round_trips() {
        let cache = InMemorySharedCache::new();
        cache
            .set("tier", "1|2", "payload", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            cache.get("tier", "1|2").await.unwrap(),
            Some("payload".to_string())
        );
    }

    #[tokio::test]
    async fn get_with_budget_returns_none_on_miss() {
        let cache = NullSharedCache;
        assert_eq!(get_with_budget(&cache, "tier", "k").await, None);
    }
}
