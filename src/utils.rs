use crate::error::PoolError;
use alloy_primitives::{I256, U256};

pub const ONE: U256 = U256::from_limbs([1, 0, 0, 0]);
pub const TWO: U256 = U256::from_limbs([2, 0, 0, 0]);

/// 512-bit intermediate used by [`crate::full_math::mul_div`] so that
/// `a * b` never truncates before the division is applied.
pub type U512 = ruint::Uint<512, 8>;

pub fn widen(x: U256) -> U512 {
    let limbs = x.into_limbs();
    U512::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3], 0, 0, 0, 0])
}

/// Narrows a 512-bit product back to 256 bits, `None` if it does not fit.
pub fn narrow(x: U512) -> Option<U256> {
    let limbs = x.into_limbs();
    if limbs[4] | limbs[5] | limbs[6] | limbs[7] != 0 {
        None
    } else {
        Some(U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]]))
    }
}

pub fn u256_to_i256(u: U256) -> I256 {
    I256::from_raw(u)
}

pub fn i256_to_u256(i: I256) -> U256 {
    i.into_raw()
}

/// Applies a signed liquidity delta to an unsigned gross/active total,
/// shared between `TickBook` and `PoolEngine`'s own active-liquidity field.
pub fn add_liquidity_delta(liquidity: u128, delta: i128) -> Result<u128, PoolError> {
    if delta < 0 {
        liquidity.checked_sub(delta.unsigned_abs()).ok_or(PoolError::LiquidityOverflow)
    } else {
        liquidity.checked_add(delta as u128).ok_or(PoolError::LiquidityOverflow)
    }
}
