//! Fixed-point helpers for share accounting.
//!
//! Amounts are `u64`. Products are taken in `u128` so `a * b` can never
//! overflow before the division, and the quotient is narrowed back with a
//! checked conversion.

use crate::config::BPS_DENOMINATOR;

/// `floor(a * b / denominator)`. `None` on a zero denominator or when the
/// quotient does not fit in `u64`.
pub fn mul_div(a: u64, b: u64, denominator: u64) -> Option<u64> {
    if denominator == 0 {
        return None;
    }
    let product = u128::from(a) * u128::from(b);
    u64::try_from(product / u128::from(denominator)).ok()
}

/// `ceil(a * b / denominator)`.
pub fn mul_div_ceil(a: u64, b: u64, denominator: u64) -> Option<u64> {
    if denominator == 0 {
        return None;
    }
    let product = u128::from(a) * u128::from(b);
    let denominator = u128::from(denominator);
    let quotient = product / denominator;
    let rounded = if product % denominator == 0 {
        quotient
    } else {
        quotient + 1
    };
    u64::try_from(rounded).ok()
}

/// `amount * weight_bps / 10_000`, rounded down.
pub fn apply_bps(amount: u64, weight_bps: u16) -> u64 {
    // weight_bps <= 10_000, so the quotient is always <= amount.
    mul_div(amount, u64::from(weight_bps), u64::from(BPS_DENOMINATOR)).unwrap_or(0)
}
