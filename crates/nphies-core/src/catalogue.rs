//! Shared catalogue/cache data shapes (spec §3, §4.2, §4.4): the records the
//! Catalogue Store owns and the Shared Cache stores copies of. Kept in
//! `nphies-core` so the catalogue, cache, normalizer, pricing, and signer
//! crates all agree on one representation instead of each defining their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FacilityId, Money, PayerId};

/// A facility's mapping from an internal procedure code to the national SBS
/// code, as resolved by a human, an AI suggestion, or a direct DB hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbsMapping {
    pub facility_id: FacilityId,
    pub internal_code: String,
    pub sbs_code: String,
    pub source: MappingSource,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    Database,
    AiSuggested,
}

/// A facility+payer's pricing tier: the markup and cap applied to non-bundled
/// line items (spec §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTier {
    pub facility_id: FacilityId,
    pub payer_id: PayerId,
    pub tier_name: String,
    pub markup_bps: i64,
    pub cap: Option<Money>,
    /// A line item whose quantity exceeds this is a soft violation (spec
    /// §4.5 step 5); `None` means no tier-level quantity cap.
    pub max_quantity_per_line: Option<u32>,
}

/// A flat-priced bundle of SBS codes. When a claim's resolved codes are a
/// superset of `member_codes`, the bundle price replaces the sum of the
/// member items' individually-priced amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub bundle_id: String,
    pub member_codes: Vec<String>,
    pub flat_price: Money,
}

/// Signing certificate metadata; the private key material itself never flows
/// through this type (see `nphies-signer`'s key source abstraction).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateMeta {
    pub facility_id: FacilityId,
    pub serial: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl CertificateMeta {
    /// Half-open validity window: `not_before <= at < not_after` (spec §3,
    /// §4.6). The instant `at == not_after` counts as expired.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.not_before && at < self.not_after
    }
}

/// The cache namespaces the Shared Cache and local LRU both partition by, so
/// a TTL or eviction policy tuned for one kind of entry never collides with
/// another (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    SbsMap,
    Tier,
    Bundle,
    CertMeta,
}

impl CacheNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheNamespace::SbsMap => "sbs_map",
            CacheNamespace::Tier => "tier",
            CacheNamespace::Bundle => "bundle",
            CacheNamespace::CertMeta => "cert_meta",
        }
    }
}
