//! Signer (spec §4.6, component C5): RSA-2048/SHA-256 detached signatures
//! over canonicalized FHIR bundles, with per-facility key material.

pub mod keysource;
pub mod signer;

pub use keysource::{EnvKeySource, KeySourceProvider};
pub use signer::{SignResult, Signer};
