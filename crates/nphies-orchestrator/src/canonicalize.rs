//! Deterministic bytes over a priced claim (spec §4.6): the Signer never
//! re-derives what it signs, so this is the one place in the pipeline that
//! defines what "the bundle" means on the wire.

use serde::Serialize;

use nphies_core::claim::Claim;
use nphies_envelope::ClaimError;
use nphies_pricing::{PricedClaim, PricedLineItem, Totals};

#[derive(Serialize)]
struct CanonicalBundle<'a> {
    claim_id: &'a str,
    facility_id: i64,
    payer_id: i64,
    member_id: &'a str,
    priced_line_items: &'a [PricedLineItem],
    totals: Totals,
    applied_bundles: &'a [String],
}

/// `priced_line_items` is already in ascending `sequence` order (the pricing
/// engine walks `claim.line_items` in the order the caller supplied), so a
/// plain field-ordered JSON encode is deterministic without a separate sort
/// pass here.
pub fn canonicalize(claim: &Claim, priced: &PricedClaim) -> Result<Vec<u8>, ClaimError> {
    let bundle = CanonicalBundle {
        claim_id: claim.claim_id.as_ref(),
        facility_id: claim.facility_id.0,
        payer_id: claim.payer.payer_id.0,
        member_id: &claim.payer.member_id,
        priced_line_items: &priced.priced_line_items,
        totals: priced.totals,
        applied_bundles: &priced.applied_bundles,
    };
    serde_json::to_vec(&bundle)
        .map_err(|e| ClaimError::internal("ORCHESTRATOR_CANONICALIZE_FAILED", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use nphies_core::claim::{ClaimType, Gender, Patient, PayerRef};
    use nphies_core::types::{ClaimId, FacilityId, Money, PayerId};

    fn sample_claim() -> Claim {
        Claim {
            claim_id: ClaimId("CLM-1".into()),
            facility_id: FacilityId(1),
            claim_type: ClaimType::Professional,
            patient: Patient {
                name: "Test Patient".into(),
                national_id: "1".into(),
                age: 30,
                gender: Gender::Male,
            },
            payer: PayerRef {
                payer_id: PayerId(1),
                member_id: "MEM-1".into(),
            },
            service_date: NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(),
            diagnosis_codes: vec![],
            line_items: vec![],
        }
    }

    fn sample_priced() -> PricedClaim {
        PricedClaim {
            priced_line_items: vec![],
            totals: Totals {
                gross: Money::new(200, 0),
                net: Money::new(220, 0),
                patient_share: Money::ZERO,
            },
            applied_bundles: vec![],
            violations: vec![],
        }
    }

    #[test]
    fn same_inputs_produce_identical_bytes() {
        let claim = sample_claim();
        let priced = sample_priced();
        let a = canonicalize(&claim, &priced).unwrap();
        let b = canonicalize(&claim, &priced).unwrap();
        assert_eq!(a, b);
    }
}
