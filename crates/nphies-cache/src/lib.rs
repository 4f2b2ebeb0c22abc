//! Two-tier cache (spec §4.4, component C2) fronting the catalogue store: a
//! process-local LRU plus an optional shared/distributed tier.

pub mod local;
pub mod shared;

pub use local::LocalCache;
pub use shared::{get_with_budget, InMemorySharedCache, NullSharedCache, SharedCache};
