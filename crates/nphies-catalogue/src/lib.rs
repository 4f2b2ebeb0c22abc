//! Catalogue Store (spec §4.2, component C1): pooled Postgres access to SBS
//! mappings, pricing tiers, bundles, and signing certificates.

pub mod pool;
pub mod store;

pub use pool::{connect, PoolConfig};
pub use store::{CatalogueStore, PgCatalogueStore};
