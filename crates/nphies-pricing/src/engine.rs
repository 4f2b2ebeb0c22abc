//! The deterministic pricing algorithm (spec §4.5). A pure function of a
//! claim, its resolved tier, and the bundles that apply to it — no I/O, no
//! internal mutable state.

use std::collections::{BTreeSet, HashSet};

use nphies_core::catalogue::{Bundle, PricingTier};
use nphies_core::claim::Claim;
use nphies_core::types::{Money, MoneyHp};
use nphies_envelope::ClaimError;

use crate::types::{PricedClaim, PricedLineItem, Totals, Violation, ViolationKind};

struct SelectedBundle<'a> {
    bundle: &'a Bundle,
}

/// Pick, in priority order, the bundles whose full membership is covered by
/// `resolved_codes`, skipping any bundle that would double-claim a code
/// already committed to a higher-priority bundle (spec §4.5 step 3).
fn select_bundles<'a>(bundles: &'a [Bundle], resolved_codes: &BTreeSet<String>) -> Vec<SelectedBundle<'a>> {
    let mut candidates: Vec<&Bundle> = bundles
        .iter()
        .filter(|b| !b.member_codes.is_empty() && b.member_codes.iter().all(|c| resolved_codes.contains(c)))
        .collect();

    candidates.sort_by(|a, b| {
        b.member_codes
            .len()
            .cmp(&a.member_codes.len())
            .then_with(|| a.flat_price.minor_units().cmp(&b.flat_price.minor_units()))
            .then_with(|| a.bundle_id.cmp(&b.bundle_id))
    });

    let mut used: HashSet<&str> = HashSet::new();
    let mut selected = Vec::new();
    for bundle in candidates {
        if bundle.member_codes.iter().any(|c| used.contains(c.as_str())) {
            continue;
        }
        for c in &bundle.member_codes {
            used.insert(c.as_str());
        }
        selected.push(SelectedBundle { bundle });
    }
    selected
}

/// Split `total` across `weights` proportionally, correcting for rounding so
/// the parts sum to exactly `total`. The correction lands on the last
/// element so the split is deterministic given a fixed line-item order.
fn pro_rata_split(total: Money, weights: &[Money]) -> Vec<Money> {
    let weight_sum: i128 = weights.iter().map(|w| w.minor_units() as i128).sum();
    if weight_sum == 0 || weights.is_empty() {
        return vec![Money::ZERO; weights.len()];
    }

    let mut parts: Vec<i64> = weights
        .iter()
        .map(|w| ((total.minor_units() as i128 * w.minor_units() as i128) / weight_sum) as i64)
        .collect();

    let allocated: i64 = parts.iter().sum();
    let remainder = total.minor_units() - allocated;
    if let Some(last) = parts.last_mut() {
        *last += remainder;
    }

    parts.into_iter().map(Money::from_minor_units).collect()
}

/// Run the pricing algorithm against an already-resolved tier and the
/// bundles configured for this facility/payer.
pub fn price(claim: &Claim, tier: &PricingTier, bundles: &[Bundle]) -> Result<PricedClaim, ClaimError> {
    let resolved_codes: BTreeSet<String> = claim.resolved_sbs_codes().into_iter().collect();
    let selected_bundles = select_bundles(bundles, &resolved_codes);

    let mut bundle_of_code: std::collections::HashMap<&str, &Bundle> = std::collections::HashMap::new();
    for sel in &selected_bundles {
        for c in &sel.bundle.member_codes {
            bundle_of_code.insert(c.as_str(), sel.bundle);
        }
    }

    let mut violations = Vec::new();
    let mut priced_items = Vec::with_capacity(claim.line_items.len());

    // Group line items by the bundle (if any) covering their SBS code, so
    // each bundle's flat price can be pro-rated across its member lines.
    let mut bundle_groups: std::collections::HashMap<&str, Vec<usize>> = std::collections::HashMap::new();
    for (idx, item) in claim.line_items.iter().enumerate() {
        let code = item.sbs_code.as_deref().unwrap_or_default();
        if let Some(bundle) = bundle_of_code.get(code) {
            bundle_groups.entry(bundle.bundle_id.as_str()).or_default().push(idx);
        }
    }

    let mut allowed_by_index: Vec<Option<Money>> = vec![None; claim.line_items.len()];
    let mut bundle_id_by_index: Vec<Option<String>> = vec![None; claim.line_items.len()];

    for sel in &selected_bundles {
        let indices = match bundle_groups.get(sel.bundle.bundle_id.as_str()) {
            Some(v) => v.clone(),
            None => continue,
        };
        let billed_weights: Vec<Money> = indices
            .iter()
            .map(|&i| line_billed(&claim.line_items[i]))
            .collect();
        let allocations = pro_rata_split(sel.bundle.flat_price, &billed_weights);
        for (slot, &idx) in indices.iter().enumerate() {
            allowed_by_index[idx] = Some(allocations[slot]);
            bundle_id_by_index[idx] = Some(sel.bundle.bundle_id.clone());
        }
    }

    for (idx, item) in claim.line_items.iter().enumerate() {
        let billed = line_billed(item);

        if let Some(max_qty) = tier.max_quantity_per_line {
            if item.quantity > max_qty {
                violations.push(Violation {
                    kind: ViolationKind::QuantityExceedsTierMaximum,
                    sequence: item.sequence,
                    detail: format!("quantity {} exceeds tier maximum {}", item.quantity, max_qty),
                });
            }
        }

        let (allowed, markup_applied, bundle_id) = match allowed_by_index[idx].take() {
            Some(bundle_allowed) => (bundle_allowed, false, bundle_id_by_index[idx].clone()),
            None => {
                let hp = MoneyHp::from_money(billed);
                let markup = hp.mul_bps(tier.markup_bps);
                let mut allowed_money = hp.add(markup).round_half_even();
                if let Some(cap) = tier.cap {
                    if allowed_money > cap {
                        allowed_money = cap;
                    }
                }
                (allowed_money, true, None)
            }
        };

        priced_items.push(PricedLineItem {
            sequence: item.sequence,
            sbs_code: item.sbs_code.clone().unwrap_or_default(),
            billed,
            allowed,
            markup_applied,
            bundle_id,
        });
    }

    let gross = sum_money(priced_items.iter().map(|p| p.billed))?;
    let net = sum_money(priced_items.iter().map(|p| p.allowed))?;
    let patient_share = gross.checked_sub(net).filter(|m| !m.is_negative()).unwrap_or(Money::ZERO);

    let applied_bundles = selected_bundles.iter().map(|s| s.bundle.bundle_id.clone()).collect();

    Ok(PricedClaim {
        priced_line_items: priced_items,
        totals: Totals { gross, net, patient_share },
        applied_bundles,
        violations,
    })
}

fn line_billed(item: &nphies_core::claim::LineItem) -> Money {
    Money::from_minor_units(item.unit_price.minor_units() * item.quantity as i64)
}

fn sum_money(values: impl Iterator<Item = Money>) -> Result<Money, ClaimError> {
    let mut total = Money::ZERO;
    for v in values {
        total = total
            .checked_add(v)
            .ok_or_else(|| ClaimError::invalid_input("PRICING_TOTAL_OVERFLOW", "priced totals overflowed"))?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use nphies_core::claim::{ClaimType, Gender, LineItem, Patient, PayerRef};
    use nphies_core::types::{ClaimId, FacilityId, PayerId};

    fn line(seq: u32, sbs: &str, qty: u32, unit_price: Money) -> LineItem {
        LineItem {
            sequence: seq,
            internal_code: "internal".into(),
            quantity: qty,
            unit_price,
            service_date: NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(),
            description: None,
            sbs_code: Some(sbs.to_string()),
        }
    }

    fn claim(items: Vec<LineItem>) -> Claim {
        Claim {
            claim_id: ClaimId("CLM-1".into()),
            facility_id: FacilityId(1),
            claim_type: ClaimType::Professional,
            patient: Patient { name: "P".into(), national_id: "1234567890".into(), age: 30, gender: Gender::Male },
            payer: PayerRef { payer_id: PayerId(1), member_id: "M1".into() },
            service_date: NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(),
            diagnosis_codes: vec!["A00".into()],
            line_items: items,
        }
    }

    fn tier(markup_bps: i64, cap: Option<Money>) -> PricingTier {
        PricingTier {
            facility_id: FacilityId(1),
            payer_id: PayerId(1),
            tier_name: "standard".into(),
            markup_bps,
            cap,
            max_quantity_per_line: None,
        }
    }

    #[test]
    fn s1_happy_path_matches_spec_scenario() {
        let c = claim(vec![line(1, "SBS-123-456", 1, Money::new(200, 0))]);
        let t = tier(1000, None);
        let result = price(&c, &t, &[]).unwrap();
        assert_eq!(result.totals.net, Money::new(220, 0));
        assert_eq!(result.priced_line_items[0].allowed, Money::new(220, 0));
        assert!(result.priced_line_items[0].bundle_id.is_none());
    }

    #[test]
    fn s2_bundle_applied_matches_spec_scenario() {
        let c = claim(vec![
            line(1, "SBS-A", 1, Money::new(150, 0)),
            line(2, "SBS-B", 1, Money::new(200, 0)),
        ]);
        let t = tier(1000, None);
        let bundle = Bundle {
            bundle_id: "B1".into(),
            member_codes: vec!["SBS-A".into(), "SBS-B".into()],
            flat_price: Money::new(300, 0),
        };
        let result = price(&c, &t, &[bundle]).unwrap();
        assert_eq!(result.totals.net, Money::new(300, 0));
        assert_eq!(result.applied_bundles, vec!["B1".to_string()]);
        assert!(result.priced_line_items.iter().all(|li| li.bundle_id.as_deref() == Some("B1")));
    }

    #[test]
    fn overlapping_bundles_prefer_greatest_member_count() {
        let c = claim(vec![
            line(1, "SBS-A", 1, Money::new(100, 0)),
            line(2, "SBS-B", 1, Money::new(100, 0)),
            line(3, "SBS-C", 1, Money::new(100, 0)),
        ]);
        let t = tier(0, None);
        let small = Bundle { bundle_id: "SMALL".into(), member_codes: vec!["SBS-A".into(), "SBS-B".into()], flat_price: Money::new(150, 0) };
        let big = Bundle { bundle_id: "BIG".into(), member_codes: vec!["SBS-A".into(), "SBS-B".into(), "SBS-C".into()], flat_price: Money::new(250, 0) };
        let result = price(&c, &t, &[small, big]).unwrap();
        assert_eq!(result.applied_bundles, vec!["BIG".to_string()]);
    }

    #[test]
    fn cap_limits_allowed_amount() {
        let c = claim(vec![line(1, "SBS-X", 1, Money::new(200, 0))]);
        let t = tier(5000, Some(Money::new(210, 0)));
        let result = price(&c, &t, &[]).unwrap();
        assert_eq!(result.priced_line_items[0].allowed, Money::new(210, 0));
    }

    #[test]
    fn quantity_over_tier_max_is_a_soft_violation() {
        let c = claim(vec![line(1, "SBS-X", 5, Money::new(10, 0))]);
        let mut t = tier(0, None);
        t.max_quantity_per_line = Some(2);
        let result = price(&c, &t, &[]).unwrap();
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].kind, ViolationKind::QuantityExceedsTierMaximum);
    }

    #[test]
    fn pricing_is_idempotent_given_the_same_inputs() {
        let c = claim(vec![line(1, "SBS-123-456", 2, Money::new(75, 50))]);
        let t = tier(750, Some(Money::new(200, 0)));
        let first = price(&c, &t, &[]).unwrap();
        let second = price(&c, &t, &[]).unwrap();
        assert_eq!(first, second);
    }
}
