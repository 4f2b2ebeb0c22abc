//! Process-wide counters rendered as Prometheus text exposition (spec §4.4,
//! §4.9): the same `AtomicU64`-behind-a-struct shape as
//! `nphies_normalizer::NormalizerMetrics`, generalized to the HTTP surface.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ApiMetrics {
    pub requests_total: AtomicU64,
    pub requests_failed_total: AtomicU64,
    pub claims_accepted_total: AtomicU64,
    pub rate_limited_total: AtomicU64,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.requests_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_claim_accepted(&self) {
        self.claims_accepted_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }
}

/// Render this process's counters plus the normalizer's cache/AI counters in
/// Prometheus text exposition format (spec §4.4: "requests_total/cache_hits/
/// etc").
pub fn render_prometheus(api: &ApiMetrics, normalizer: &nphies_normalizer::NormalizerMetrics) -> String {
    let mut out = String::new();
    push_counter(&mut out, "nphies_requests_total", api.requests_total.load(Ordering::Relaxed));
    push_counter(
        &mut out,
        "nphies_requests_failed_total",
        api.requests_failed_total.load(Ordering::Relaxed),
    );
    push_counter(
        &mut out,
        "nphies_claims_accepted_total",
        api.claims_accepted_total.load(Ordering::Relaxed),
    );
    push_counter(
        &mut out,
        "nphies_rate_limited_total",
        api.rate_limited_total.load(Ordering::Relaxed),
    );
    push_counter(
        &mut out,
        "nphies_normalizer_cache_hits_total",
        normalizer.cache_hits.load(Ordering::Relaxed),
    );
    push_counter(
        &mut out,
        "nphies_normalizer_db_hits_total",
        normalizer.db_hits.load(Ordering::Relaxed),
    );
    push_counter(
        &mut out,
        "nphies_normalizer_ai_hits_total",
        normalizer.ai_hits.load(Ordering::Relaxed),
    );
    push_counter(
        &mut out,
        "nphies_normalizer_ai_failures_total",
        normalizer.ai_failures.load(Ordering::Relaxed),
    );
    push_counter(
        &mut out,
        "nphies_normalizer_misses_total",
        normalizer.misses.load(Ordering::Relaxed),
    );
    out
}

fn push_counter(out: &mut String, name: &str, value: u64) {
    out.push_str(&format!("# TYPE {name} counter\n{name} {value}\n"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_every_counter_name() {
        let api = ApiMetrics::new();
        api.record_request();
        let normalizer = nphies_normalizer::NormalizerMetrics::default();
        let text = render_prometheus(&api, &normalizer);
        assert!(text.contains("nphies_requests_total 1"));
        assert!(text.contains("nphies_normalizer_cache_hits_total 0"));
    }
}
