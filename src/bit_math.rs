//! Most/least significant bit helpers used by the tick bitmap and by
//! `tickAtSqrtRatio`'s integer log2.

use crate::error::PoolError;
use alloy_primitives::U256;
use ruint::uint;

pub fn most_significant_bit(mut x: U256) -> Result<u8, PoolError> {
    if x.is_zero() {
        return Err(PoolError::Overflow);
    }

    let mut r = 0u8;

    if x >= uint!(0x100000000000000000000000000000000_U256) {
        x >>= 128;
        r += 128;
    }
    if x >= uint!(0x10000000000000000_U256) {
        x >>= 64;
        r += 64;
    }
    if x >= uint!(0x100000000_U256) {
        x >>= 32;
        r += 32;
    }
    if x >= uint!(0x10000_U256) {
        x >>= 16;
        r += 16;
    }
    if x >= uint!(0x100_U256) {
        x >>= 8;
        r += 8;
    }
    if x >= uint!(0x10_U256) {
        x >>= 4;
        r += 4;
    }
    if x >= uint!(0x4_U256) {
        x >>= 2;
        r += 2;
    }
    if x >= uint!(0x2_U256) {
        r += 1;
    }

    Ok(r)
}

pub fn least_significant_bit(x: U256) -> Result<u8, PoolError> {
    if x.is_zero() {
        return Err(PoolError::Overflow);
    }

    let mut x = x;
    let mut r = 255u8;

    if !(x & U256::from(u128::MAX)).is_zero() {
        r -= 128;
    } else {
        x >>= 128;
    }
    if !(x & U256::from(u64::MAX)).is_zero() {
        r -= 64;
    } else {
        x >>= 64;
    }
    if !(x & U256::from(u32::MAX)).is_zero() {
        r -= 32;
    } else {
        x >>= 32;
    }
    if !(x & U256::from(u16::MAX)).is_zero() {
        r -= 16;
    } else {
        x >>= 16;
    }
    if !(x & U256::from(u8::MAX)).is_zero() {
        r -= 8;
    } else {
        x >>= 8;
    }
    if !(x & uint!(0xf_U256)).is_zero() {
        r -= 4;
    } else {
        x >>= 4;
    }
    if !(x & uint!(0x3_U256)).is_zero() {
        r -= 2;
    } else {
        x >>= 2;
    }
    if !(x & uint!(0x1_U256)).is_zero() {
        r -= 1;
    }

    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{ONE, TWO};

    #[test]
    fn zero_is_rejected() {
        assert_eq!(most_significant_bit(U256::ZERO), Err(PoolError::Overflow));
        assert_eq!(least_significant_bit(U256::ZERO), Err(PoolError::Overflow));
    }

    #[test]
    fn powers_of_two() {
        for i in 0..=255u32 {
            let v = TWO.pow(U256::from(i));
            assert_eq!(most_significant_bit(v).unwrap(), i as u8);
            assert_eq!(least_significant_bit(v).unwrap(), i as u8);
        }
    }

    #[test]
    fn all_ones() {
        assert_eq!(most_significant_bit(U256::MAX).unwrap(), 255);
        assert_eq!(least_significant_bit(U256::MAX).unwrap(), 0);
    }

    #[test]
    fn one() {
        assert_eq!(most_significant_bit(ONE).unwrap(), 0);
    }
}
