//! Output shapes of the pricing algorithm (spec §4.5).

use serde::{Deserialize, Serialize};

use nphies_core::types::Money;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedLineItem {
    pub sequence: u32,
    pub sbs_code: String,
    /// `quantity * unit_price`, before any markup or bundle substitution.
    pub billed: Money,
    /// The amount the payer covers for this line after tier rules.
    pub allowed: Money,
    pub markup_applied: bool,
    pub bundle_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub gross: Money,
    pub net: Money,
    pub patient_share: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    QuantityExceedsTierMaximum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub sequence: u32,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedClaim {
    pub priced_line_items: Vec<PricedLineItem>,
    pub totals: Totals,
    pub applied_bundles: Vec<String>,
    pub violations: Vec<Violation>,
}
