//! Money arithmetic on currency minor units.
//!
//! All persisted amounts are integers in the currency's minor unit (cents).
//! Commission arithmetic runs through [`rust_decimal`] so the rounding rule
//! (half away from zero, to whole minor units) is explicit rather than an
//! artifact of binary floats.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Maximum accepted difference, in minor units, between the stake recorded
/// at checkout time and the amount the provider reports as captured.
/// One minor unit corresponds to 0.01 of the major currency unit.
pub const AMOUNT_TOLERANCE_MINOR: i64 = 1;

/// Commission owed on a stake, in minor units.
///
/// `stake × rate`, rounded half away from zero to a whole minor unit
/// (equivalently: to 2 decimals of the major unit).
#[must_use]
pub fn commission_minor(amount_minor: i64, rate: Decimal) -> i64 {
    (Decimal::from(amount_minor) * rate)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

/// Payout after commission deduction, in minor units.
///
/// Applies to both dispositions: the owner's refund on success and the
/// association's donation on failure.
#[must_use]
pub fn payout_minor(amount_minor: i64, commission_minor: i64) -> i64 {
    amount_minor.saturating_sub(commission_minor)
}

/// Whether a provider-reported captured amount agrees with the stored stake
/// within [`AMOUNT_TOLERANCE_MINOR`].
#[must_use]
pub const fn amounts_match(stored_minor: i64, reported_minor: i64) -> bool {
    (stored_minor - reported_minor).abs() <= AMOUNT_TOLERANCE_MINOR
}
