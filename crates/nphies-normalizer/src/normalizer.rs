//! Code normalization (spec §4.3, component C3): map a facility's internal
//! procedure code to a national SBS code via cache, then the catalogue
//! database, then an AI suggestion provider as a last resort.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{info, warn};

use nphies_cache::{get_with_budget, LocalCache, SharedCache};
use nphies_catalogue::CatalogueStore;
use nphies_core::catalogue::{CacheNamespace, MappingSource, SbsMapping};
use nphies_core::constants::{BREAKER_COOLDOWN, BREAKER_FAILURE_THRESHOLD, BREAKER_FAILURE_WINDOW, CACHE_TTL_SBS_AI, CACHE_TTL_SBS_DB};
use nphies_core::types::FacilityId;
use nphies_envelope::ClaimError;

use crate::breaker::CircuitBreaker;
use crate::provider::SuggestionProvider;

#[derive(Debug, Default)]
pub struct NormalizerMetrics {
    pub cache_hits: AtomicU64,
    pub db_hits: AtomicU64,
    pub ai_hits: AtomicU64,
    pub ai_failures: AtomicU64,
    pub misses: AtomicU64,
}

pub struct Normalizer {
    catalogue: Arc<dyn CatalogueStore>,
    shared_cache: Arc<dyn SharedCache>,
    local_cache: LocalCache<SbsMapping>,
    ai_provider: Arc<dyn SuggestionProvider>,
    breaker: Mutex<CircuitBreaker>,
    pub metrics: NormalizerMetrics,
}

impl Normalizer {
    pub fn new(
        catalogue: Arc<dyn CatalogueStore>,
        shared_cache: Arc<dyn SharedCache>,
        ai_provider: Arc<dyn SuggestionProvider>,
        local_cache_capacity: usize,
    ) -> Self {
        Normalizer {
            catalogue,
            shared_cache,
            local_cache: LocalCache::new(local_cache_capacity),
            ai_provider,
            breaker: Mutex::new(CircuitBreaker::new(
                BREAKER_FAILURE_THRESHOLD,
                BREAKER_FAILURE_WINDOW,
                BREAKER_COOLDOWN,
            )),
            metrics: NormalizerMetrics::default(),
        }
    }

    fn cache_key(facility_id: FacilityId, internal_code: &str) -> String {
        format!("{facility_id}|{internal_code}")
    }

    pub async fn normalize(
        &self,
        facility_id: FacilityId,
        internal_code: &str,
        description: Option<&str>,
    ) -> Result<SbsMapping, ClaimError> {
        let key = Self::cache_key(facility_id, internal_code);

        if let Some(mapping) = self.local_cache.get(CacheNamespace::SbsMap, &key) {
            self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(mapping);
        }

        if let Some(raw) = get_with_budget(self.shared_cache.as_ref(), CacheNamespace::SbsMap.as_str(), &key).await {
            if let Ok(mapping) = serde_json::from_str::<SbsMapping>(&raw) {
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                self.local_cache.set(CacheNamespace::SbsMap, key, mapping.clone(), CACHE_TTL_SBS_DB);
                return Ok(mapping);
            }
        }

        if let Some(mapping) = self.catalogue.get_sbs_mapping(facility_id, internal_code).await? {
            self.metrics.db_hits.fetch_add(1, Ordering::Relaxed);
            self.populate_caches(&key, &mapping, CACHE_TTL_SBS_DB).await;
            return Ok(mapping);
        }

        self.try_ai_fallback(facility_id, internal_code, description, &key).await
    }

    async fn try_ai_fallback(
        &self,
        facility_id: FacilityId,
        internal_code: &str,
        description: Option<&str>,
        key: &str,
    ) -> Result<SbsMapping, ClaimError> {
        let allowed = self.breaker.lock().allow(Instant::now());
        if !allowed {
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
            return Err(ClaimError::not_found(
                "NORMALIZER_NOT_FOUND",
                format!("no mapping for internal_code {internal_code} and AI fallback is open"),
            ));
        }

        match self.ai_provider.suggest(internal_code, description).await {
            Ok(suggestion) => {
                // AI suggestions are provisional (spec §4.4: persisted with
                // `is_active = false`, awaiting operator promotion) and are
                // not held to the catalogue's strict SBS code format — a
                // placeholder like "SBS-PENDING-X" is an expected shape.
                self.breaker.lock().record_success(Instant::now());
                self.metrics.ai_hits.fetch_add(1, Ordering::Relaxed);

                let mapping = SbsMapping {
                    facility_id,
                    internal_code: internal_code.to_string(),
                    sbs_code: suggestion.sbs_code.clone(),
                    source: MappingSource::AiSuggested,
                    confidence: Some(suggestion.resolved_confidence()),
                };

                if let Err(e) = self.catalogue.record_ai_suggestion(&mapping).await {
                    warn!(error = %e, "failed to record AI suggestion; continuing with in-flight mapping");
                }

                self.populate_caches(key, &mapping, CACHE_TTL_SBS_AI).await;
                Ok(mapping)
            }
            Err(e) => {
                self.breaker.lock().record_failure(Instant::now());
                self.metrics.ai_failures.fetch_add(1, Ordering::Relaxed);
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                info!(error = %e, internal_code, "AI suggestion provider failed");
                Err(ClaimError::not_found(
                    "NORMALIZER_NOT_FOUND",
                    format!("no mapping for internal_code {internal_code}"),
                )
                .with_cause(e))
            }
        }
    }

    async fn populate_caches(&self, key: &str, mapping: &SbsMapping, ttl: std::time::Duration) {
        self.local_cache.set(CacheNamespace::SbsMap, key.to_string(), mapping.clone(), ttl);
        if let Ok(raw) = serde_json::to_string(mapping) {
            let _ = self.shared_cache.set(CacheNamespace::SbsMap.as_str(), key, &raw, ttl).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use nphies_cache::NullSharedCache;
    use nphies_core::catalogue::{Bundle, CertificateMeta, PricingTier};
    use nphies_core::types::PayerId;
    use nphies_envelope::ClaimError as Err;
    use std::sync::Mutex as StdMutex;

    struct FakeCatalogue {
        mapping: Option<SbsMapping>,
        suggestions_recorded: StdMutex<Vec<SbsMapping>>,
    }

    #[async_trait]
    impl CatalogueStore for FakeCatalogue {
        async fn get_sbs_mapping(&self, _f: FacilityId, _c: &str) -> Result<Option<SbsMapping>, Err> {
            Ok(self.mapping.clone())
        }
        async fn get_pricing_tier(&self, _f: FacilityId, _p: PayerId) -> Result<Option<PricingTier>, Err> {
            Ok(None)
        }
        async fn get_candidate_bundles(&self, _f: FacilityId, _codes: &[String]) -> Result<Vec<Bundle>, Err> {
            Ok(vec![])
        }
        async fn get_active_certificate(&self, _f: FacilityId, _at: DateTime<Utc>) -> Result<Option<CertificateMeta>, Err> {
            Ok(None)
        }
        async fn record_ai_suggestion(&self, mapping: &SbsMapping) -> Result<(), Err> {
            self.suggestions_recorded.lock().unwrap().push(mapping.clone());
            Ok(())
        }
    }

    struct FakeProvider {
        sbs_code: &'static str,
    }

    #[async_trait]
    impl SuggestionProvider for FakeProvider {
        async fn suggest(&self, _code: &str, _desc: Option<&str>) -> Result<crate::provider::Suggestion, Err> {
            Ok(crate::provider::Suggestion {
                sbs_code: self.sbs_code.to_string(),
                confidence: Some(0.95),
            })
        }
    }

    #[tokio::test]
    async fn db_hit_skips_ai_fallback() {
        let mapping = SbsMapping {
            facility_id: FacilityId(1),
            internal_code: "PROC-1".into(),
            sbs_code: "SBS-ABC-001".into(),
            source: MappingSource::Database,
            confidence: None,
        };
        let normalizer = Normalizer::new(
            Arc::new(FakeCatalogue { mapping: Some(mapping.clone()), suggestions_recorded: StdMutex::new(vec![]) }),
            Arc::new(NullSharedCache),
            Arc::new(crate::provider::NullSuggestionProvider),
            16,
        );
        let result = normalizer.normalize(FacilityId(1), "PROC-1", None).await.unwrap();
        assert_eq!(result.sbs_code, "SBS-ABC-001");
        assert_eq!(normalizer.metrics.db_hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn ai_fallback_used_when_db_misses() {
        let normalizer = Normalizer::new(
            Arc::new(FakeCatalogue { mapping: None, suggestions_recorded: StdMutex::new(vec![]) }),
            Arc::new(NullSharedCache),
            Arc::new(FakeProvider { sbs_code: "SBS-XYZ-999" }),
            16,
        );
        let result = normalizer.normalize(FacilityId(1), "PROC-9", Some("desc")).await.unwrap();
        assert_eq!(result.sbs_code, "SBS-XYZ-999");
        assert_eq!(result.source, MappingSource::AiSuggested);
        assert_eq!(normalizer.metrics.ai_hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn ai_fallback_accepts_pending_placeholder_code() {
        let normalizer = Normalizer::new(
            Arc::new(FakeCatalogue { mapping: None, suggestions_recorded: StdMutex::new(vec![]) }),
            Arc::new(NullSharedCache),
            Arc::new(FakeProvider { sbs_code: "SBS-PENDING-X" }),
            16,
        );
        let result = normalizer.normalize(FacilityId(1), "PROC-9", Some("desc")).await.unwrap();
        assert_eq!(result.sbs_code, "SBS-PENDING-X");
        assert_eq!(result.source, MappingSource::AiSuggested);
        assert_eq!(result.confidence, Some(0.95));
    }

    #[tokio::test]
    async fn no_provider_and_no_db_mapping_is_not_found() {
        let normalizer = Normalizer::new(
            Arc::new(FakeCatalogue { mapping: None, suggestions_recorded: StdMutex::new(vec![]) }),
            Arc::new(NullSharedCache),
            Arc::new(crate::provider::NullSuggestionProvider),
            16,
        );
        let err = normalizer.normalize(FacilityId(1), "PROC-9", None).await.unwrap_err();
        assert_eq!(err.code, "NORMALIZER_NOT_FOUND");
    }

    #[tokio::test]
    async fn cache_hit_on_second_call() {
        let mapping = SbsMapping {
            facility_id: FacilityId(1),
            internal_code: "PROC-1".into(),
            sbs_code: "SBS-ABC-001".into(),
            source: MappingSource::Database,
            confidence: None,
        };
        let normalizer = Normalizer::new(
            Arc::new(FakeCatalogue { mapping: Some(mapping), suggestions_recorded: StdMutex::new(vec![]) }),
            Arc::new(NullSharedCache),
            Arc::new(crate::provider::NullSuggestionProvider),
            16,
        );
        normalizer.normalize(FacilityId(1), "PROC-1", None).await.unwrap();
        normalizer.normalize(FacilityId(1), "PROC-1", None).await.unwrap();
        assert_eq!(normalizer.metrics.cache_hits.load(Ordering::Relaxed), 1);
        assert_eq!(normalizer.metrics.db_hits.load(Ordering::Relaxed), 1);
    }
}
