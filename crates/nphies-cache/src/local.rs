//! The process-local cache tier (spec §4.4): an LRU-bounded, TTL-expiring
//! map partitioned by [`CacheNamespace`] so a hot SBS mapping and a rarely
//! refreshed pricing tier don't compete for the same eviction budget.

use std::time::{Duration, Instant};

use lru::LruCache;
use nphies_core::catalogue::CacheNamespace;
use parking_lot::Mutex;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Cached values are immutable once inserted (spec §4.4): callers replace a
/// stale entry with `set`, never mutate it in place.
pub struct LocalCache<V: Clone> {
    namespaces: Mutex<[LruCache<String, Entry<V>>; 4]>,
}

impl<V: Clone> LocalCache<V> {
    pub fn new(capacity_per_namespace: usize) -> Self {
        let cap = std::num::NonZeroUsize::new(capacity_per_namespace.max(1)).unwrap();
        LocalCache {
            namespaces: Mutex::new([
                LruCache::new(cap),
                LruCache::new(cap),
                LruCache::new(cap),
                LruCache::new(cap),
            ]),
        }
    }

    fn slot(namespace: CacheNamespace) -> usize {
        match namespace {
            CacheNamespace::SbsMap => 0,
            CacheNamespace::Tier => 1,
            CacheNamespace::Bundle => 2,
            CacheNamespace::CertMeta => 3,
        }
    }

    pub fn get(&self, namespace: CacheNamespace, key: &str) -> Option<V> {
        let mut guard = self.namespaces.lock();
        let cache = &mut guard[Self::slot(namespace)];
        match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, namespace: CacheNamespace, key: String, value: V, ttl: Duration) {
        let mut guard = self.namespaces.lock();
        let cache = &mut guard[Self::slot(namespace)];
        cache.put(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn invalidate(&self, namespace: CacheNamespace, key: &str) {
        let mut guard = self.namespaces.lock();
        guard[Self::slot(namespace)].pop(key);
    }

    pub fn len(&self, namespace: CacheNamespace) -> usize {
        self.namespaces.lock()[Self::slot(namespace)].len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let cache: LocalCache<String> = LocalCache::new(16);
        cache.set(
            CacheNamespace::SbsMap,
            "1|PROC-1".into(),
            "SBS-ABC-001".into(),
            Duration::from_secs(60),
        );
        assert_eq!(
            cache.get(CacheNamespace::SbsMap, "1|PROC-1"),
            Some("SBS-ABC-001".to_string())
        );
    }

    #[test]
    fn expired_entry_is_treated_as_a_miss() {
        let cache: LocalCache<String> = LocalCache::new(16);
        cache.set(
            CacheNamespace::Tier,
            "k".into(),
            "v".into(),
            Duration::from_millis(0),
        );
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(CacheNamespace::Tier, "k"), None);
    }

    #[test]
    fn namespaces_are_isolated() {
        let cache: LocalCache<String> = LocalCache::new(16);
        cache.set(
            CacheNamespace::SbsMap,
            "k".into(),
            "sbs".into(),
            Duration::from_secs(60),
        );
        assert_eq!(cache.get(CacheNamespace::Bundle, "k"), None);
    }

    #[test]
    fn invalidate_removes_the_entry() {
        let cache: LocalCache<String> = LocalCache::new(16);
        cache.set(
            CacheNamespace::CertMeta,
            "k".into(),
            "v".into(),
            Duration::from_secs(60),
        );
        cache.invalidate(CacheNamespace::CertMeta, "k");
        assert_eq!(cache.get(CacheNamespace::CertMeta, "k"), None);
    }
}
