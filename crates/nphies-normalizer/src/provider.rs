//! The AI suggestion fallback abstraction (spec §4.3): normalization falls
//! back to a suggestion provider only when neither the cache nor the
//! database has a mapping. Kept behind a trait so the pipeline never depends
//! on a specific AI vendor.

use async_trait::async_trait;

use nphies_core::constants::AI_DEFAULT_CONFIDENCE;
use nphies_envelope::ClaimError;

#[derive(Debug, Clone)]
pub struct Suggestion {
    pub sbs_code: String,
    /// Provider-reported confidence in `[0, 1]`. When the provider doesn't
    /// report one, callers fall back to [`AI_DEFAULT_CONFIDENCE`] per the
    /// resolution of the spec's AI-confidence open question (see DESIGN.md).
    pub confidence: Option<f64>,
}

impl Suggestion {
    pub fn resolved_confidence(&self) -> f64 {
        match self.confidence {
            Some(c) if (0.0..=1.0).contains(&c) => c,
            _ => AI_DEFAULT_CONFIDENCE,
        }
    }
}

#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    async fn suggest(
        &self,
        internal_code: &str,
        description: Option<&str>,
    ) -> Result<Suggestion, ClaimError>;
}

/// The default when no AI provider is configured: every call fails with
/// `UpstreamUnavailable`, so the normalizer's fallback chain ends in a clean
/// `NotFound` rather than hanging on a provider that was never wired up.
pub struct NullSuggestionProvider;

#[async_trait]
impl SuggestionProvider for NullSuggestionProvider {
    async fn suggest(
        &self,
        _internal_code: &str,
        _description: Option<&str>,
    ) -> Result<Suggestion, ClaimError> {
        Err(ClaimError::upstream_unavailable(
            "NORMALIZER_NO_AI_PROVIDER",
            "no suggestion provider is configured",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_confidence_falls_back_to_default() {
        let s = Suggestion {
            sbs_code: "SBS-ABC-001".into(),
            confidence: Some(1.5),
        };
        assert_eq!(s.resolved_confidence(), AI_DEFAULT_CONFIDENCE);
    }

    #[test]
    fn missing_confidence_falls_back_to_default() {
        let s = Suggestion {
            sbs_code: "SBS-ABC-001".into(),
            confidence: None,
        };
        assert_eq!(s.resolved_confidence(), AI_DEFAULT_CONFIDENCE);
    }

    #[test]
    fn in_range_confidence_is_kept() {
        let s = Suggestion {
            sbs_code: "SBS-ABC-001".into(),
            confidence: Some(0.9),
        };
        assert_eq!(s.resolved_confidence(), 0.9);
    }

    #[tokio::test]
    async fn null_provider_always_fails() {
        let provider = NullSuggestionProvider;
        let err = provider.suggest("PROC-1", None).await.unwrap_err();
        assert_eq!(err.code, "NORMALIZER_NO_AI_PROVIDER");
    }
}
