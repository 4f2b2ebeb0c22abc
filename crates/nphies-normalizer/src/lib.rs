//! Code Normalizer (spec §4.3, component C3): resolves facility-internal
//! procedure codes to national SBS codes via cache, database, then AI.

pub mod breaker;
pub mod normalizer;
pub mod provider;

pub use breaker::CircuitBreaker;
pub use normalizer::{Normalizer, NormalizerMetrics};
pub use provider::{NullSuggestionProvider, Suggestion, SuggestionProvider};
