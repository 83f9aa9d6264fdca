//! Moves `sqrtPriceX96` by a token amount, and the inverse: the token amount
//! swept between two sqrt prices at a given liquidity. Adapted from the
//! teacher's `sqrt_price_math`, ported onto `alloy_primitives::I256` signed
//! deltas instead of an externally-owned signed integer type.

use crate::error::PoolError;
use crate::full_math::{mul_div, mul_div_rounding_up};
use crate::unsafe_math::div_rounding_up;
use crate::utils::u256_to_i256;
use alloy_primitives::{I256, U256};
use ruint::uint;

pub const MAX_U160: U256 =
    U256::from_limbs([18446744073709551615, 18446744073709551615, 4294967295, 0]);
pub const Q96: U256 = U256::from_limbs([0, 4294967296, 0, 0]);
pub const FIXED_POINT_96_RESOLUTION: usize = 96;

pub fn get_next_sqrt_price_from_input(
    sqrt_price: U256,
    liquidity: u128,
    amount_in: U256,
    zero_for_one: bool,
) -> Result<U256, PoolError> {
    if sqrt_price.is_zero() {
        return Err(PoolError::Overflow);
    } else if liquidity == 0 {
        return Err(PoolError::Overflow);
    }

    if zero_for_one {
        get_next_sqrt_price_from_amount_0_rounding_up(sqrt_price, liquidity, amount_in, true)
    } else {
        get_next_sqrt_price_from_amount_1_rounding_down(sqrt_price, liquidity, amount_in, true)
    }
}

pub fn get_next_sqrt_price_from_output(
    sqrt_price: U256,
    liquidity: u128,
    amount_out: U256,
    zero_for_one: bool,
) -> Result<U256, PoolError> {
    if sqrt_price.is_zero() {
        return Err(PoolError::Overflow);
    } else if liquidity == 0 {
        return Err(PoolError::Overflow);
    }

    if zero_for_one {
        get_next_sqrt_price_from_amount_1_rounding_down(sqrt_price, liquidity, amount_out, false)
    } else {
        get_next_sqrt_price_from_amount_0_rounding_up(sqrt_price, liquidity, amount_out, false)
    }
}

pub fn get_next_sqrt_price_from_amount_0_rounding_up(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, PoolError> {
    if amount.is_zero() {
        return Ok(sqrt_price_x96);
    }

    let numerator_1: U256 = U256::from(liquidity) << 96;

    if add {
        let product = amount.wrapping_mul(sqrt_price_x96);

        if product.wrapping_div(amount) == sqrt_price_x96 {
            let denominator = numerator_1.wrapping_add(product);

            if denominator >= numerator_1 {
                return mul_div_rounding_up(numerator_1, sqrt_price_x96, denominator);
            }
        }

        Ok(div_rounding_up(
            numerator_1,
            (numerator_1.wrapping_div(sqrt_price_x96)).wrapping_add(amount),
        ))
    } else {
        let product = amount.wrapping_mul(sqrt_price_x96);
        if product.wrapping_div(amount) == sqrt_price_x96 && numerator_1 > product {
            let denominator = numerator_1.wrapping_sub(product);
            mul_div_rounding_up(numerator_1, sqrt_price_x96, denominator)
        } else {
            Err(PoolError::Overflow)
        }
    }
}

pub fn get_next_sqrt_price_from_amount_1_rounding_down(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: U256,
    add: bool,
) -> Result<U256, PoolError> {
    if add {
        let quotient = if amount <= MAX_U160 {
            (amount << FIXED_POINT_96_RESOLUTION) / U256::from(liquidity)
        } else {
            mul_div(amount, Q96, U256::from(liquidity))?
        };

        let next_sqrt_price = sqrt_price_x96 + quotient;

        if next_sqrt_price > MAX_U160 {
            Err(PoolError::Overflow)
        } else {
            Ok(next_sqrt_price)
        }
    } else {
        let quotient = if amount <= MAX_U160 {
            div_rounding_up(amount << FIXED_POINT_96_RESOLUTION, U256::from(liquidity))
        } else {
            mul_div_rounding_up(amount, Q96, U256::from(liquidity))?
        };

        if sqrt_price_x96 <= quotient {
            return Err(PoolError::Overflow);
        }

        Ok(sqrt_price_x96.overflowing_sub(quotient).0)
    }
}

pub fn get_amount_0_delta_unsigned(
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, PoolError> {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        (sqrt_ratio_a_x96, sqrt_ratio_b_x96) = (sqrt_ratio_b_x96, sqrt_ratio_a_x96)
    };

    let numerator_1: U256 = U256::from(liquidity) << 96;
    let numerator_2 = sqrt_ratio_b_x96 - sqrt_ratio_a_x96;

    if sqrt_ratio_a_x96.is_zero() {
        return Err(PoolError::Overflow);
    }

    if round_up {
        let numerator_partial = mul_div_rounding_up(numerator_1, numerator_2, sqrt_ratio_b_x96)?;
        Ok(div_rounding_up(numerator_partial, sqrt_ratio_a_x96))
    } else {
        Ok(mul_div(numerator_1, numerator_2, sqrt_ratio_b_x96)? / sqrt_ratio_a_x96)
    }
}

pub fn get_amount_1_delta_unsigned(
    mut sqrt_ratio_a_x96: U256,
    mut sqrt_ratio_b_x96: U256,
    liquidity: u128,
    round_up: bool,
) -> Result<U256, PoolError> {
    if sqrt_ratio_a_x96 > sqrt_ratio_b_x96 {
        (sqrt_ratio_a_x96, sqrt_ratio_b_x96) = (sqrt_ratio_b_x96, sqrt_ratio_a_x96)
    };

    if round_up {
        mul_div_rounding_up(
            U256::from(liquidity),
            sqrt_ratio_b_x96 - sqrt_ratio_a_x96,
            uint!(0x1000000000000000000000000_U256),
        )
    } else {
        mul_div(
            U256::from(liquidity),
            sqrt_ratio_b_x96 - sqrt_ratio_a_x96,
            uint!(0x1000000000000000000000000_U256),
        )
    }
}

/// Signed variant: negative `liquidity` means the position is being removed
/// and the delta flips sign, matching the withdrawal side of a burn.
pub fn get_amount_0_delta(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: i128,
) -> Result<I256, PoolError> {
    if liquidity < 0 {
        Ok(-u256_to_i256(get_amount_0_delta_unsigned(
            sqrt_ratio_a_x96,
            sqrt_ratio_b_x96,
            -liquidity as u128,
            false,
        )?))
    } else {
        Ok(u256_to_i256(get_amount_0_delta_unsigned(
            sqrt_ratio_a_x96,
            sqrt_ratio_b_x96,
            liquidity as u128,
            true,
        )?))
    }
}

pub fn get_amount_1_delta(
    sqrt_ratio_a_x96: U256,
    sqrt_ratio_b_x96: U256,
    liquidity: i128,
) -> Result<I256, PoolError> {
    if liquidity < 0 {
        Ok(-u256_to_i256(get_amount_1_delta_unsigned(
            sqrt_ratio_a_x96,
            sqrt_ratio_b_x96,
            -liquidity as u128,
            false,
        )?))
    } else {
        Ok(u256_to_i256(get_amount_1_delta_unsigned(
            sqrt_ratio_a_x96,
            sqrt_ratio_b_x96,
            liquidity as u128,
            true,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ONE;

    #[test]
    fn fails_on_zero_price_or_liquidity() {
        assert_eq!(
            get_next_sqrt_price_from_input(U256::ZERO, 0, U256::from(1u128), false),
            Err(PoolError::Overflow)
        );
        assert_eq!(
            get_next_sqrt_price_from_input(ONE, 0, U256::from(1u128), true),
            Err(PoolError::Overflow)
        );
    }

    #[test]
    fn fails_if_input_overflows_u160() {
        let result = get_next_sqrt_price_from_input(MAX_U160, 1024, U256::from(1024u32), false);
        assert_eq!(result, Err(PoolError::Overflow));
    }

    #[test]
    fn zero_amount_in_returns_input_price() {
        let price = uint!(79228162514264337593543950336_U256);
        assert_eq!(
            get_next_sqrt_price_from_input(price, 1e17 as u128, U256::ZERO, true).unwrap(),
            price
        );
        assert_eq!(
            get_next_sqrt_price_from_input(price, 1e17 as u128, U256::ZERO, false).unwrap(),
            price
        );
    }

    #[test]
    fn input_amount_of_token1_moves_price_up() {
        let price = uint!(79228162514264337593543950336_U256);
        let result =
            get_next_sqrt_price_from_input(price, 1e18 as u128, uint!(100000000000000000_U256), false)
                .unwrap();
        assert_eq!(result, uint!(87150978765690771352898345369_U256));
    }

    #[test]
    fn input_amount_of_token0_moves_price_down() {
        let price = uint!(79228162514264337593543950336_U256);
        let result =
            get_next_sqrt_price_from_input(price, 1e18 as u128, uint!(100000000000000000_U256), true)
                .unwrap();
        assert_eq!(result, uint!(72025602285694852357767227579_U256));
    }

    #[test]
    fn amount_0_delta_round_trip() {
        let amount_0 = get_amount_0_delta_unsigned(
            uint!(79228162514264337593543950336_U256),
            uint!(87150978765690771352898345369_U256),
            1e18 as u128,
            true,
        )
        .unwrap();
        assert_eq!(amount_0, uint!(90909090909090910_U256));

        let rounded_down = get_amount_0_delta_unsigned(
            uint!(79228162514264337593543950336_U256),
            uint!(87150978765690771352898345369_U256),
            1e18 as u128,
            false,
        )
        .unwrap();
        assert_eq!(rounded_down, amount_0 - ONE);
    }

    #[test]
    fn amount_1_delta_round_trip() {
        let amount_1 = get_amount_1_delta_unsigned(
            uint!(79228162514264337593543950336_U256),
            uint!(87150978765690771352898345369_U256),
            1e18 as u128,
            true,
        )
        .unwrap();
        assert_eq!(amount_1, uint!(100000000000000000_U256));
    }

    #[test]
    fn swap_computation_round_trips_against_amount_in() {
        let sqrt_price = uint!(1025574284609383690408304870162715216695788925244_U256);
        let liquidity = 50015962439936049619261659728067971248;
        let amount_in = U256::from(406u32);

        let sqrt_q =
            get_next_sqrt_price_from_input(sqrt_price, liquidity, amount_in, true).unwrap();
        assert_eq!(sqrt_q, uint!(1025574284609383582644711336373707553698163132913_U256));

        let amount_0_delta =
            get_amount_0_delta_unsigned(sqrt_q, sqrt_price, liquidity, true).unwrap();
        assert_eq!(amount_0_delta, U256::from(406u32));
    }
}
