//! Full-precision `mulDiv`, adapted from the teacher's bit-math routines but
//! using a genuine 512-bit intermediate (`crate::utils::U512`) rather than
//! relying on the host language's native overflow behavior.

use crate::error::PoolError;
use crate::utils::{narrow, widen};
use alloy_primitives::U256;

/// `floor(a * b / denominator)`, computed without intermediate truncation.
///
/// Fails with [`PoolError::Overflow`] if `denominator == 0` or the quotient
/// does not fit back into 256 bits.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, PoolError> {
    if denominator.is_zero() {
        return Err(PoolError::Overflow);
    }
    let product = widen(a) * widen(b);
    let denom = widen(denominator);
    narrow(product / denom).ok_or(PoolError::Overflow)
}

/// `ceil(a * b / denominator)`.
pub fn mul_div_rounding_up(a: U256, b: U256, denominator: U256) -> Result<U256, PoolError> {
    if denominator.is_zero() {
        return Err(PoolError::Overflow);
    }
    let product = widen(a) * widen(b);
    let denom = widen(denominator);
    let (quotient, remainder) = (product / denom, product % denom);
    let result = narrow(quotient).ok_or(PoolError::Overflow)?;
    if remainder.is_zero() {
        Ok(result)
    } else {
        result.checked_add(U256::from(1)).ok_or(PoolError::Overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruint::uint;

    #[test]
    fn floor_division() {
        let r = mul_div(uint!(10_U256), uint!(3_U256), uint!(4_U256)).unwrap();
        assert_eq!(r, uint!(7_U256));
    }

    #[test]
    fn rounding_up_with_remainder() {
        let r = mul_div_rounding_up(uint!(10_U256), uint!(3_U256), uint!(4_U256)).unwrap();
        assert_eq!(r, uint!(8_U256));
    }

    #[test]
    fn rounding_up_exact() {
        let r = mul_div_rounding_up(uint!(8_U256), uint!(3_U256), uint!(4_U256)).unwrap();
        assert_eq!(r, uint!(6_U256));
    }

    #[test]
    fn zero_denominator_overflows() {
        assert_eq!(
            mul_div(uint!(1_U256), uint!(1_U256), U256::ZERO),
            Err(PoolError::Overflow)
        );
    }

    #[test]
    fn full_width_product_does_not_truncate() {
        // a*b overflows 256 bits on its own, but the quotient fits.
        let a = U256::MAX;
        let b = U256::from(2u8);
        let denom = U256::from(4u8);
        let r = mul_div(a, b, denom).unwrap();
        // floor((2^256-1)*2/4) = floor((2^256-1)/2)
        assert_eq!(r, (U256::MAX) >> 1);
    }
}
