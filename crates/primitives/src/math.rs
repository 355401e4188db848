//! Deterministic integer math for the pricing algorithms.
//!
//! Every counter update routes through these helpers. Overflow never wraps and never panics: values
//! clamp at the bounds of their type so that independent re-executions stay bit-identical.
use alloy_primitives::{I256, U256};

/// One whole in basis points.
pub const BIPS_MULTIPLIER: u64 = 10_000;

/// Clamps `value` into `i64`.
#[inline]
pub const fn saturating_i64(value: u64) -> i64 {
    if value > i64::MAX as u64 {
        i64::MAX
    } else {
        value as i64
    }
}

/// Clamps `value` into `u64`.
#[inline]
pub fn saturating_u64(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

/// Clamps an unsigned 256-bit value into the non-negative half of `I256`.
#[inline]
pub fn saturating_i256(value: U256) -> I256 {
    I256::try_from(value).unwrap_or(I256::MAX)
}

/// Converts a `u64` into `I256`. Always exact.
#[inline]
pub fn i256_from_u64(value: u64) -> I256 {
    I256::from_raw(U256::from(value))
}

/// Returns the magnitude of a non-negative `I256`, or zero for negative values.
#[inline]
pub fn non_negative_u256(value: I256) -> U256 {
    if value.is_negative() {
        U256::ZERO
    } else {
        value.into_raw()
    }
}

/// Adds two signed values, clamping at the bounds of `I256`.
///
/// The flag is `true` when the exact sum did not fit and was clamped.
#[inline]
pub fn saturating_add_i256(a: I256, b: I256) -> (I256, bool) {
    match a.checked_add(b) {
        Some(sum) => (sum, false),
        None if b.is_negative() => (I256::MIN, true),
        None => (I256::MAX, true),
    }
}

/// Subtracts two signed values, clamping at the bounds of `I256`.
///
/// The flag is `true` when the exact difference did not fit and was clamped.
#[inline]
pub fn saturating_sub_i256(a: I256, b: I256) -> (I256, bool) {
    match a.checked_sub(b) {
        Some(diff) => (diff, false),
        None if b.is_negative() => (I256::MAX, true),
        None => (I256::MIN, true),
    }
}

/// Euclidean division: the remainder is never negative. A zero divisor yields zero.
#[inline]
pub fn div_euclid_i256(a: I256, b: I256) -> I256 {
    if b.is_zero() {
        return I256::ZERO;
    }
    let quotient = a / b;
    if (a % b).is_negative() {
        if b.is_negative() {
            quotient + I256::ONE
        } else {
            quotient - I256::ONE
        }
    } else {
        quotient
    }
}

/// Adds a signed delta to an unsigned counter, clamping at `0` and `u64::MAX`.
///
/// A positive `delta` pays the counter down; a negative one grows it.
#[inline]
pub const fn apply_signed_delta(value: u64, delta: i64) -> u64 {
    if delta > 0 {
        value.saturating_sub(delta as u64)
    } else {
        value.saturating_add(delta.unsigned_abs())
    }
}

/// Multiplies `value` by `bips / 10000`.
#[inline]
pub fn u256_mul_by_bips(value: U256, bips: u64) -> U256 {
    value.saturating_mul(U256::from(bips)) / U256::from(BIPS_MULTIPLIER)
}

/// Multiplies `value` by `bips / 10000`, saturating the intermediate product.
#[inline]
pub const fn saturating_mul_by_bips(value: u64, bips: u64) -> u64 {
    value.saturating_mul(bips) / BIPS_MULTIPLIER
}

/// Number of bits needed to represent `value`.
#[inline]
pub const fn log2_ceil(value: u64) -> u64 {
    (u64::BITS - value.leading_zeros()) as u64
}

/// Approximates `e^(bips / 10000)` in basis points using a truncated Taylor series evaluated in
/// Horner form with `accuracy` terms.
///
/// The coefficients and truncation order are part of the protocol: base fees computed from this
/// value must match across implementations bit for bit. Negative exponents return the reciprocal.
/// An accuracy of zero is treated as one.
pub fn approx_exp_basis_points(bips: i64, accuracy: u64) -> i64 {
    let accuracy = accuracy.max(1);
    let input = bips.unsigned_abs();

    let mut result = BIPS_MULTIPLIER + input / accuracy;
    for i in 1..accuracy {
        result =
            BIPS_MULTIPLIER + result.saturating_mul(input) / ((accuracy - i) * BIPS_MULTIPLIER);
    }

    if bips < 0 {
        saturating_i64(BIPS_MULTIPLIER * BIPS_MULTIPLIER / result)
    } else {
        saturating_i64(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::zero(0, 10_000)]
    #[case::one(10_000, 27_083)]
    #[case::two(20_000, 70_000)]
    #[case::minus_one(-10_000, 3_692)]
    #[case::saturated_product(i64::MAX / 1000, 1_844_674_407_380_955)]
    fn test_approx_exp_basis_points(#[case] bips: i64, #[case] expected: i64) {
        assert_eq!(approx_exp_basis_points(bips, 4), expected);
    }

    #[test]
    fn test_approx_exp_is_monotonic() {
        let mut last = 0;
        for bips in (0..200_000).step_by(997) {
            let value = approx_exp_basis_points(bips, 4);
            assert!(value >= last);
            last = value;
        }
    }

    #[rstest]
    #[case::in_range(5, 5)]
    #[case::at_max(i64::MAX as u64, i64::MAX)]
    #[case::above_max(u64::MAX, i64::MAX)]
    fn test_saturating_i64(#[case] value: u64, #[case] expected: i64) {
        assert_eq!(saturating_i64(value), expected);
    }

    #[rstest]
    #[case::pay_down(150, 100, 50)]
    #[case::pay_down_past_zero(50, 100, 0)]
    #[case::grow(150, -100, 250)]
    #[case::grow_saturates(u64::MAX - 1, -100, u64::MAX)]
    #[case::min_delta(0, i64::MIN, 1 << 63)]
    fn test_apply_signed_delta(#[case] value: u64, #[case] delta: i64, #[case] expected: u64) {
        assert_eq!(apply_signed_delta(value, delta), expected);
    }

    #[test]
    fn test_conversions_saturate() {
        assert_eq!(saturating_u64(U256::MAX), u64::MAX);
        assert_eq!(saturating_u64(U256::from(7)), 7);
        assert_eq!(saturating_i256(U256::MAX), I256::MAX);
        assert_eq!(i256_from_u64(u64::MAX).into_raw(), U256::from(u64::MAX));
        assert_eq!(non_negative_u256(I256::MINUS_ONE), U256::ZERO);
    }

    #[test]
    fn test_flagged_i256_arithmetic() {
        let one = I256::ONE;
        assert_eq!(saturating_add_i256(I256::MAX, one), (I256::MAX, true));
        assert_eq!(saturating_add_i256(I256::MIN, I256::MINUS_ONE), (I256::MIN, true));
        assert_eq!(saturating_add_i256(I256::MAX, I256::MINUS_ONE).1, false);
        assert_eq!(saturating_sub_i256(I256::MIN, one), (I256::MIN, true));
        assert_eq!(saturating_sub_i256(I256::ZERO, I256::MIN), (I256::MAX, true));
        assert_eq!(saturating_sub_i256(I256::ZERO, I256::MAX), (-I256::MAX, false));
    }

    #[rstest]
    #[case::exact(8, 2, 4)]
    #[case::positive(7, 2, 3)]
    #[case::negative_dividend(-7, 2, -4)]
    #[case::negative_divisor(-7, -2, 4)]
    #[case::zero_divisor(5, 0, 0)]
    fn test_div_euclid_i256(#[case] a: i64, #[case] b: i64, #[case] expected: i64) {
        let to_i256 = |v: i64| I256::try_from(v).unwrap();
        assert_eq!(div_euclid_i256(to_i256(a), to_i256(b)), to_i256(expected));
    }

    #[test]
    fn test_bips() {
        assert_eq!(u256_mul_by_bips(U256::from(3000 * 78), 100), U256::from(2340));
        assert_eq!(saturating_mul_by_bips(u64::MAX, 2), u64::MAX / BIPS_MULTIPLIER);
    }

    #[test]
    fn test_log2_ceil() {
        assert_eq!(log2_ceil(0), 0);
        assert_eq!(log2_ceil(1), 1);
        assert_eq!(log2_ceil(2), 2);
        assert_eq!(log2_ceil(3), 2);
        assert_eq!(log2_ceil(4), 3);
    }
}
