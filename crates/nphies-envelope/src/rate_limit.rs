//! A single shared rate limiter type used by every route (spec §9: one
//! limiter type instead of a scattered per-service one). State is a bounded
//! map behind a mutex with an eviction timer, keyed on a caller-supplied
//! sliding window.

use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Width of the sliding window.
    pub window: Duration,
    /// Max requests allowed per key within `window`.
    pub max_per_key: u32,
    /// Upper bound on distinct tracked keys before LRU eviction kicks in.
    pub tracked_keys_max: usize,
    /// How often the background sweep expires stale windows.
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_per_key: 100,
            tracked_keys_max: 10_000,
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone)]
struct Window {
    /// Timestamps (monotonic) of requests observed within the current window.
    hits: Vec<Instant>,
    last_seen: Instant,
}

pub struct Decision {
    pub allowed: bool,
    pub retry_after_ms: u64,
}

/// Sliding-window rate limiter keyed by an arbitrary string (spec calls for
/// `(client_ip, route_class)` — callers format that tuple into the key).
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<LruCache<String, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let cap = std::num::NonZeroUsize::new(config.tracked_keys_max.max(1)).unwrap();
        Self {
            config,
            windows: Mutex::new(LruCache::new(cap)),
        }
    }

    /// `allow(key) -> {allowed, retry_after_ms}` (spec §4.1 contract).
    /// O(1) amortized: the per-key hit list is pruned lazily on each call
    /// rather than by a separate structure.
    pub fn allow(&self, key: &str) -> Decision {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        if !windows.contains(key) {
            windows.put(
                key.to_string(),
                Window {
                    hits: Vec::new(),
                    last_seen: now,
                },
            );
        }
        let entry = windows.get_mut(key).expect("just inserted");
        entry.last_seen = now;
        entry.hits.retain(|t| now.duration_since(*t) < self.config.window);

        if entry.hits.len() as u32 >= self.config.max_per_key {
            let oldest = entry.hits.first().copied().unwrap_or(now);
            let elapsed = now.duration_since(oldest);
            let retry_after = self.config.window.saturating_sub(elapsed);
            return Decision {
                allowed: false,
                retry_after_ms: retry_after.as_millis() as u64,
            };
        }

        entry.hits.push(now);
        Decision {
            allowed: true,
            retry_after_ms: 0,
        }
    }

    /// Number of keys currently tracked — used to assert the memory-bound
    /// invariant in spec §8 ("rate-limiter tracked key count never exceeds
    /// the configured cap").
    pub fn tracked_key_count(&self) -> usize {
        self.windows.lock().len()
    }

    /// Background tick (spec §4.1: "expires windows older than 2x window
    /// size"). Intended to be driven by a `tokio::time::interval` in the
    /// hosting binary; kept synchronous here so it has no runtime
    /// dependency and is trivial to unit test.
    pub fn sweep(&self) {
        let now = Instant::now();
        let stale_after = self.config.window * 2;
        let mut windows = self.windows.lock();
        let stale_keys: Vec<String> = windows
            .iter()
            .filter(|(_, w)| now.duration_since(w.last_seen) > stale_after)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale_keys {
            windows.pop(&key);
        }
    }

    /// Spawn the periodic sweep task. Returns the `JoinHandle` so the caller
    /// can abort it during graceful shutdown.
    pub fn spawn_cleanup_task(self: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.config.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }
}

/// Format a `(client_ip, route_class)` pair into the limiter's key space.
pub fn route_key(client_ip: &str, route_class: &str) -> String {
    format!("{client_ip}|{route_class}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_blocks() {
        let limiter = RateLimiter::new(RateLimitConfig {
            window: Duration::from_secs(60),
            max_per_key: 3,
            tracked_keys_max: 100,
            cleanup_interval: Duration::from_secs(300),
        });
        let key = route_key("1.2.3.4", "claim");
        assert!(limiter.allow(&key).allowed);
        assert!(limiter.allow(&key).allowed);
        assert!(limiter.allow(&key).allowed);
        let decision = limiter.allow(&key);
        assert!(!decision.allowed);
        assert!(decision.retry_after_ms > 0);
    }

    #[test]
    fn tracked_keys_never_exceed_cap() {
        let limiter = RateLimiter::new(RateLimitConfig {
            window: Duration::from_secs(60),
            max_per_key: 100,
            tracked_keys_max: 5,
            cleanup_interval: Duration::from_secs(300),
        });
        for i in 0..50 {
            limiter.allow(&format!("key-{i}"));
        }
        assert!(limiter.tracked_key_count() <= 5);
    }

    #[test]
    fn sweep_evicts_stale_windows() {
        let limiter = RateLimiter::new(RateLimitConfig {
            window: Duration::from_millis(10),
            max_per_key: 10,
            tracked_keys_max: 100,
            cleanup_interval: Duration::from_secs(300),
        });
        limiter.allow("k1");
        assert_eq!(limiter.tracked_key_count(), 1);
        std::thread::sleep(Duration::from_millis(30));
        limiter.sweep();
        assert_eq!(limiter.tracked_key_count(), 0);
    }
}
