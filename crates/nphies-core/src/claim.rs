//! The in-flight Claim (spec §3): the unit of work the pipeline processes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use nphies_envelope::validate::{validate_facility_id, validate_national_id};
use nphies_envelope::ClaimError;

use crate::types::{ClaimId, FacilityId, Money, PayerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Professional,
    Institutional,
    Pharmacy,
    Vision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub name: String,
    pub national_id: String,
    pub age: u16,
    pub gender: Gender,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayerRef {
    pub payer_id: PayerId,
    pub member_id: String,
}

/// One billable line on a claim, in the units the facility uses internally
/// (the Normalizer maps `internal_code` to an SBS code downstream).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub sequence: u32,
    pub internal_code: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub service_date: NaiveDate,
    pub description: Option<String>,
    /// Populated by the Normalizer once the claim has passed that stage.
    pub sbs_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: ClaimId,
    pub facility_id: FacilityId,
    pub claim_type: ClaimType,
    pub patient: Patient,
    pub payer: PayerRef,
    pub service_date: NaiveDate,
    pub diagnosis_codes: Vec<String>,
    pub line_items: Vec<LineItem>,
}

impl Claim {
    /// Enforce the structural invariants from spec §3: non-empty line items,
    /// `quantity >= 1`, `unit_price >= 0`, and a positive net sum. Called once
    /// at API ingress before the claim enters the pipeline.
    pub fn validate(&self) -> Result<(), ClaimError> {
        validate_facility_id("facility_id", &self.facility_id.0.to_string())?;
        validate_national_id("patient.national_id", &self.patient.national_id)?;

        if self.line_items.is_empty() {
            return Err(ClaimError::invalid_input(
                "CLAIM_NO_LINE_ITEMS",
                "a claim must contain at least one line item",
            )
            .with_detail("field", "line_items"));
        }

        let mut net_total = Money::ZERO;
        for item in &self.line_items {
            if item.quantity < 1 {
                return Err(ClaimError::invalid_input(
                    "CLAIM_LINE_ITEM_ZERO_QUANTITY",
                    format!("line item {} has quantity {}", item.sequence, item.quantity),
                )
                .with_detail("field", format!("line_items[{}].quantity", item.sequence)));
            }
            if item.unit_price.is_negative() {
                return Err(ClaimError::invalid_input(
                    "CLAIM_LINE_ITEM_NEGATIVE_PRICE",
                    format!("line item {} has a negative unit_price", item.sequence),
                )
                .with_detail("field", format!("line_items[{}].unit_price", item.sequence)));
            }
            let line_total = Money::from_minor_units(
                item.unit_price.minor_units() * item.quantity as i64,
            );
            net_total = net_total
                .checked_add(line_total)
                .ok_or_else(|| ClaimError::invalid_input("CLAIM_TOTAL_OVERFLOW", "claim total overflowed"))?;
        }

        if !net_total.minor_units().is_positive() {
            return Err(ClaimError::invalid_input(
                "CLAIM_NET_NOT_POSITIVE",
                "sum of line item nets must be greater than zero",
            ));
        }

        Ok(())
    }

    /// The distinct SBS codes already resolved onto this claim's line items.
    /// Populated after the Normalizer stage; used by the pricing engine to
    /// resolve bundles (spec §4.5 step 2).
    pub fn resolved_sbs_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self
            .line_items
            .iter()
            .filter_map(|li| li.sbs_code.clone())
            .collect();
        codes.sort();
        codes.dedup();
        codes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_line(seq: u32, price: Money, qty: u32) -> LineItem {
        LineItem {
            sequence: seq,
            internal_code: "PROC-1".into(),
            quantity: qty,
            unit_price: price,
            service_date: NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(),
            description: None,
            sbs_code: None,
        }
    }

    fn sample_claim(items: Vec<LineItem>) -> Claim {
        Claim {
            claim_id: ClaimId("CLM-1".into()),
            facility_id: FacilityId(1),
            claim_type: ClaimType::Professional,
            patient: Patient {
                name: "Test Patient".into(),
                national_id: "1234567890".into(),
                age: 40,
                gender: Gender::Male,
            },
            payer: PayerRef {
                payer_id: PayerId(1),
                member_id: "MEM-1".into(),
            },
            service_date: NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(),
            diagnosis_codes: vec!["A00".into()],
            line_items: items,
        }
    }

    #[test]
    fn zero_line_items_is_invalid_input() {
        let claim = sample_claim(vec![]);
        let err = claim.validate().unwrap_err();
        assert_eq!(err.code, "CLAIM_NO_LINE_ITEMS");
    }

    #[test]
    fn negative_unit_price_is_invalid_input() {
        let claim = sample_claim(vec![sample_line(1, Money::from_minor_units(-100), 1)]);
        let err = claim.validate().unwrap_err();
        assert_eq!(err.code, "CLAIM_LINE_ITEM_NEGATIVE_PRICE");
    }

    #[test]
    fn zero_quantity_is_invalid_input() {
        let claim = sample_claim(vec![sample_line(1, Money::new(10, 0), 0)]);
        let err = claim.validate().unwrap_err();
        assert_eq!(err.code, "CLAIM_LINE_ITEM_ZERO_QUANTITY");
    }

    #[test]
    fn positive_net_passes() {
        let claim = sample_claim(vec![sample_line(1, Money::new(200, 0), 1)]);
        assert!(claim.validate().is_ok());
    }
}
