//! Fixed-point money and percentages.
//!
//! Currency never passes through floating point: amounts are integer minor
//! units (kopecks) and percentages are basis points (1/100 of a percent).
//! Percentage arithmetic widens to `i128` and rounds half away from zero.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::value_object::ValueObject;

const MINOR_PER_MAJOR: i64 = 100;
const BP_PER_UNIT: i128 = 10_000;

/// A monetary amount in minor units.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn from_major(major: i64) -> Self {
        Self(major * MINOR_PER_MAJOR)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// Amount multiplied by a whole quantity (e.g. unit cost × units in stock).
    pub fn saturating_mul(self, qty: i64) -> Money {
        Money(self.0.saturating_mul(qty))
    }

    /// Integer division by a count, rounded half away from zero. `None` for zero.
    pub fn div_round(self, count: i64) -> Option<Money> {
        if count == 0 {
            return None;
        }
        Some(Money(clamp_i64(div_round_half_away(self.0 as i128, count as i128))))
    }

    /// Adjust by a signed percentage: `self × (1 + pct/100)`, rounded to the nearest minor unit.
    pub fn adjust_by(self, pct: Percent) -> Money {
        let num = self.0 as i128 * (BP_PER_UNIT + pct.0 as i128);
        Money(clamp_i64(div_round_half_away(num, BP_PER_UNIT)))
    }

    /// Smallest amount that yields at least `pct` markup over `self`.
    ///
    /// Used for the margin floor `cost × (1 + min_margin/100)`, rounded up so the
    /// floor is never undershot by a fraction of a minor unit.
    pub fn with_markup_ceil(self, pct: Percent) -> Money {
        let num = self.0 as i128 * (BP_PER_UNIT + pct.0 as i128);
        Money(clamp_i64(div_ceil(num, BP_PER_UNIT)))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{sign}{}.{:02}",
            abs / MINOR_PER_MAJOR as u64,
            abs % MINOR_PER_MAJOR as u64
        )
    }
}

/// A signed percentage in basis points (`1250` = 12.50%).
///
/// Serialized as a plain decimal percent (`12.5`) at the JSON boundary.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Percent(i64);

impl ValueObject for Percent {}

impl Percent {
    pub const ZERO: Percent = Percent(0);

    pub const fn from_bp(bp: i64) -> Self {
        Self(bp)
    }

    pub const fn from_whole(pct: i64) -> Self {
        Self(pct * 100)
    }

    /// Round a float percentage to the nearest basis point.
    pub fn from_f64(pct: f64) -> Self {
        if !pct.is_finite() {
            return Self::ZERO;
        }
        Self((pct * 100.0).round() as i64)
    }

    pub const fn bp(self) -> i64 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn abs(self) -> Percent {
        Percent(self.0.abs())
    }

    pub fn neg(self) -> Percent {
        Percent(-self.0)
    }

    /// Relative change from `from` to `to`. Zero when `from` is not positive.
    pub fn change(from: Money, to: Money) -> Percent {
        Percent::between(from.0, to.0).unwrap_or(Percent::ZERO)
    }

    /// Relative change between two counts; `None` when `from` is not positive.
    pub fn between(from: i64, to: i64) -> Option<Percent> {
        if from <= 0 {
            return None;
        }
        let num = (to as i128 - from as i128) * BP_PER_UNIT;
        Some(Percent(clamp_i64(div_round_half_away(num, from as i128))))
    }

    /// Gross margin `(price − cost) / price`; zero when there is no positive price.
    /// A zero cost is a 100% margin.
    ///
    /// Truncates toward zero so a margin is never reported above its true value.
    pub fn margin(price: Money, cost: Money) -> Percent {
        if price.0 <= 0 {
            return Percent::ZERO;
        }
        let num = (price.0 as i128 - cost.0 as i128) * BP_PER_UNIT;
        Percent(clamp_i64(num / price.0 as i128))
    }
}

impl core::fmt::Display for Percent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}%", self.as_f64())
    }
}

impl Serialize for Percent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Percent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pct = f64::deserialize(deserializer)?;
        if !pct.is_finite() {
            return Err(serde::de::Error::custom("percent must be finite"));
        }
        Ok(Percent::from_f64(pct))
    }
}

fn div_round_half_away(num: i128, den: i128) -> i128 {
    let q = num / den;
    let r = num % den;
    if 2 * r.abs() >= den.abs() {
        if (num < 0) == (den < 0) { q + 1 } else { q - 1 }
    } else {
        q
    }
}

fn div_ceil(num: i128, den: i128) -> i128 {
    let q = num / den;
    if num % den != 0 && (num > 0) == (den > 0) {
        q + 1
    } else {
        q
    }
}

fn clamp_i64(v: i128) -> i64 {
    v.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn displays_major_and_minor_units() {
        assert_eq!(Money::from_minor(123_450).to_string(), "1234.50");
        assert_eq!(Money::from_minor(-5).to_string(), "-0.05");
        assert_eq!(Percent::from_bp(-1550).to_string(), "-15.50%");
    }

    #[test]
    fn adjust_by_applies_signed_percentage() {
        let price = Money::from_major(1000);
        assert_eq!(price.adjust_by(Percent::from_whole(10)), Money::from_major(1100));
        assert_eq!(price.adjust_by(Percent::from_whole(-15)), Money::from_major(850));
    }

    #[test]
    fn markup_ceil_never_undershoots() {
        // 333.33 × 1.2 = 399.996 → 400.00
        let cost = Money::from_minor(33_333);
        assert_eq!(cost.with_markup_ceil(Percent::from_whole(20)), Money::from_minor(40_000));
    }

    #[test]
    fn margin_is_zero_only_without_a_price() {
        assert_eq!(Percent::margin(Money::ZERO, Money::from_major(10)), Percent::ZERO);
        assert_eq!(Percent::margin(Money::from_major(10), Money::ZERO), Percent::from_whole(100));
        assert_eq!(
            Percent::margin(Money::from_major(1000), Money::from_major(500)),
            Percent::from_whole(50)
        );
    }

    #[test]
    fn change_from_zero_base_is_zero() {
        assert_eq!(Percent::change(Money::ZERO, Money::from_major(10)), Percent::ZERO);
        assert_eq!(
            Percent::change(Money::from_major(1000), Money::from_major(890)),
            Percent::from_whole(-11)
        );
    }

    #[test]
    fn between_counts_needs_a_positive_base() {
        assert_eq!(Percent::between(10, 7), Some(Percent::from_whole(-30)));
        assert_eq!(Percent::between(0, 7), None);
    }

    #[test]
    fn percent_serializes_as_decimal() {
        let json = serde_json::to_string(&Percent::from_bp(1250)).unwrap();
        assert_eq!(json, "12.5");
        let back: Percent = serde_json::from_str("12.5").unwrap();
        assert_eq!(back, Percent::from_bp(1250));
    }

    mod proptests {
        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig { cases: 1000, .. ProptestConfig::default() })]

            #[test]
            fn markup_ceil_is_at_least_exact_floor(cost in 1i64..10_000_000, bp in 0i64..10_000) {
                let floor = Money::from_minor(cost).with_markup_ceil(Percent::from_bp(bp));
                // floor × 10_000 ≥ cost × (10_000 + bp)
                prop_assert!(floor.minor() as i128 * 10_000 >= cost as i128 * (10_000 + bp as i128));
            }

            #[test]
            fn margin_never_exceeds_hundred_percent(price in 1i64..10_000_000, cost in 1i64..10_000_000) {
                prop_assert!(Percent::margin(Money::from_minor(price), Money::from_minor(cost)).bp() < 10_000);
            }
        }
    }
}
