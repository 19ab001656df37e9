//! Integer/float helpers for token amounts.
//!
//! Amounts are `U256` base units. Ratios (slippage, rates, proportions) are `f64`;
//! multiplying an amount by a ratio goes through an 18-decimal fixed-point factor
//! so that round ratios like `0.99` scale exactly.

use alloy::primitives::U256;

/// Fixed-point scale used when multiplying amounts by `f64` factors.
const FACTOR_SCALE: u128 = 1_000_000_000_000_000_000;

/// Rounding direction for integer results.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Rounding {
    /// Toward zero
    Down,
    /// Away from zero
    Up,
}

/// `a * b / c`, rounded down. Returns zero when `c` is zero.
#[must_use]
pub fn mul_div_floor(a: U256, b: U256, c: U256) -> U256 {
    mul_div(a, b, c, Rounding::Down)
}

/// `a * b / c`, rounded up. Returns zero when `c` is zero.
#[must_use]
pub fn mul_div_ceil(a: U256, b: U256, c: U256) -> U256 {
    mul_div(a, b, c, Rounding::Up)
}

/// `a * b / c` with explicit rounding. Falls back to dividing first when the
/// product overflows, trading a few base units of precision for range.
#[must_use]
pub fn mul_div(a: U256, b: U256, c: U256, rounding: Rounding) -> U256 {
    if c.is_zero() {
        return U256::ZERO;
    }
    match a.checked_mul(b) {
        Some(product) => {
            let quotient = product / c;
            if rounding == Rounding::Up && !(product % c).is_zero() {
                quotient.saturating_add(U256::from(1))
            } else {
                quotient
            }
        }
        None => (a / c).saturating_mul(b),
    }
}

/// Multiplies `amount` by a non-negative `factor`.
#[must_use]
pub fn scale_amount(amount: U256, factor: f64, rounding: Rounding) -> U256 {
    if !factor.is_finite() || factor <= 0.0 {
        return U256::ZERO;
    }
    let fixed = f64_to_u256((factor * 1e18).round());
    mul_div(amount, fixed, U256::from(FACTOR_SCALE), rounding)
}

/// Lossy conversion of an amount to `f64`.
#[must_use]
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}

/// Conversion of a non-negative `f64` to an amount, truncating the fraction.
/// Negative and non-finite values map to zero; values beyond `U256::MAX` saturate.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn f64_to_u256(value: f64) -> U256 {
    if !value.is_finite() || value < 1.0 {
        return U256::ZERO;
    }
    if value < 3.402_823_669_209_385e38 {
        return U256::from(value as u128);
    }
    let exponent = value.log2().floor() as usize;
    if exponent >= 256 {
        return U256::MAX;
    }
    // 53 significant bits are all an f64 carries
    let shift = exponent - 52;
    let mantissa = (value / 2f64.powi(shift as i32)) as u64;
    U256::from(mantissa) << shift
}

/// `numerator / denominator` as `f64`, zero when the denominator is zero.
#[must_use]
pub fn ratio(numerator: U256, denominator: U256) -> f64 {
    if denominator.is_zero() {
        return 0.0;
    }
    u256_to_f64(numerator) / u256_to_f64(denominator)
}
