//! Scoping newtypes and the fixed-point `Money` type (spec §3, §4.5).
//!
//! `FacilityId`/`PayerId`/`ClaimId` wrap their primitive representation in
//! thin structs with explicit constructors so a `FacilityId` can never be
//! passed where a `PayerId` is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scopes code maps, pricing tiers, and certificates to one hospital/clinic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FacilityId(pub i64);

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Combined with a `FacilityId` to select a pricing tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PayerId(pub i64);

impl fmt::Display for PayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied, globally unique claim identifier; the idempotency anchor
/// for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub String);

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClaimId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ClaimId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A fixed-point amount, stored as minor units (hundredths) of SAR. Every
/// persisted or emitted monetary value is a `Money`; intermediate pricing
/// math uses [`MoneyHp`] so repeated markup/cap arithmetic doesn't compound
/// rounding error (spec §4.5: "higher-precision representation internally,
/// rounded half-even to 2 digits at the boundary").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Build from a whole-SAR and cents pair, e.g. `Money::new(220, 0)` = 220.00.
    pub fn new(whole: i64, cents: i64) -> Self {
        Money(whole * 100 + cents)
    }

    pub fn from_minor_units(minor: i64) -> Self {
        Money(minor)
    }

    pub fn minor_units(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn to_hp(self) -> MoneyHp {
        MoneyHp(self.0 as i128 * MoneyHp::SCALE_PER_MINOR_UNIT)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Higher-precision intermediate representation (4 fractional digits beyond
/// `Money`'s 2) used while applying markup percentages and bundle math so
/// that only the final emitted value is rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MoneyHp(i128);

impl MoneyHp {
    /// `Money` is hundredths; `MoneyHp` carries four more decimal digits of
    /// precision, so one minor unit of `Money` equals this many `MoneyHp` units.
    const SCALE_PER_MINOR_UNIT: i128 = 10_000;

    pub fn zero() -> Self {
        MoneyHp(0)
    }

    pub fn from_money(m: Money) -> Self {
        m.to_hp()
    }

    /// Multiply by a basis-points factor (e.g. markup_pct=0.10 => 1000 bps
    /// on top of the base, so pass `10_000 + markup_bps` to scale-and-add in
    /// one step, or pass `markup_bps` alone to get just the markup amount).
    pub fn mul_bps(self, bps: i64) -> Self {
        MoneyHp((self.0 * bps as i128) / 10_000)
    }

    pub fn add(self, other: MoneyHp) -> Self {
        MoneyHp(self.0 + other.0)
    }

    pub fn sub(self, other: MoneyHp) -> Self {
        MoneyHp(self.0 - other.0)
    }

    pub fn min(self, other: MoneyHp) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Round half-even (banker's rounding) down to `Money`'s 2 fractional
    /// digits, per spec §4.5.
    pub fn round_half_even(self) -> Money {
        let scale = Self::SCALE_PER_MINOR_UNIT;
        let quotient = self.0.div_euclid(scale);
        let remainder = self.0.rem_euclid(scale);
        let half = scale / 2;
        let rounded = match remainder.cmp(&half) {
            std::cmp::Ordering::Less => quotient,
            std::cmp::Ordering::Greater => quotient + 1,
            std::cmp::Ordering::Equal => {
                if quotient % 2 == 0 {
                    quotient
                } else {
                    quotient + 1
                }
            }
        };
        Money(rounded as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_display_formats_two_decimals() {
        assert_eq!(Money::new(220, 0).to_string(), "220.00");
        assert_eq!(Money::from_minor_units(5).to_string(), "0.05");
        assert_eq!(Money::from_minor_units(-150).to_string(), "-1.50");
    }

    #[test]
    fn hp_markup_matches_s1_scenario() {
        // S1: unit_price 200.00, quantity 1, markup_pct 0.10 -> allowed 220.00
        let base = MoneyHp::from_money(Money::new(200, 0));
        let markup = base.mul_bps(1000); // 10.00%
        let allowed = base.add(markup).round_half_even();
        assert_eq!(allowed, Money::new(220, 0));
    }

    #[test]
    fn half_even_rounds_to_nearest_even() {
        // 1.005 SAR sits exactly halfway between minor units 100 and 101;
        // 100 is even, so it rounds down to 1.00.
        let hp = MoneyHp(1_005_000); // 1.0050 SAR in hp scale (minor_units * 10000)
        assert_eq!(hp.round_half_even(), Money::new(1, 0));
        // 1.015 SAR sits halfway between 101 and 102; 102 is even, rounds up.
        let hp2 = MoneyHp(1_015_000);
        assert_eq!(hp2.round_half_even(), Money::new(1, 2));
    }
}
