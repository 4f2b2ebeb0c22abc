//! The I/O-bearing wrapper around the pure pricing [`engine`]: resolves the
//! tier and candidate bundles from the catalogue, then delegates to the
//! deterministic algorithm.

use std::sync::Arc;

use nphies_catalogue::CatalogueStore;
use nphies_core::claim::Claim;
use nphies_envelope::ClaimError;

use crate::engine;
use crate::types::PricedClaim;

pub struct PricingService {
    catalogue: Arc<dyn CatalogueStore>,
}

impl PricingService {
    pub fn new(catalogue: Arc<dyn CatalogueStore>) -> Self {
        PricingService { catalogue }
    }

    pub async fn price(&self, claim: &Claim) -> Result<PricedClaim, ClaimError> {
        let tier = self
            .catalogue
            .get_pricing_tier(claim.facility_id, claim.payer.payer_id)
            .await?
            .ok_or_else(|| {
                ClaimError::not_found(
                    "PRICING_TIER_NOT_FOUND",
                    format!(
                        "no pricing tier for facility {} payer {}",
                        claim.facility_id, claim.payer.payer_id
                    ),
                )
                .with_detail("tier", "missing")
            })?;

        let resolved_codes = claim.resolved_sbs_codes();
        let bundles = self
            .catalogue
            .get_candidate_bundles(claim.facility_id, &resolved_codes)
            .await?;

        engine::price(claim, &tier, &bundles)
    }
}
