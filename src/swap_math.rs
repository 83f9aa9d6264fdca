//! Single price-range swap step: advances the price toward a target without
//! crossing it, splitting the input into principal and fee. Adapted from the
//! teacher's `compute_swap_step`.

use crate::error::PoolError;
use crate::full_math::{mul_div, mul_div_rounding_up};
use crate::sqrt_price_math::{
    get_amount_0_delta_unsigned, get_amount_1_delta_unsigned, get_next_sqrt_price_from_input,
    get_next_sqrt_price_from_output,
};
use crate::utils::i256_to_u256;
use alloy_primitives::{I256, U256};

pub struct SwapStep {
    pub sqrt_ratio_next_x96: U256,
    pub amount_in: U256,
    pub amount_out: U256,
    pub fee_amount: U256,
}

/// `amount_remaining > 0` means exact-input (the caller is specifying how
/// much of the input token it is willing to spend); `< 0` means exact-output.
pub fn compute_swap_step(
    sqrt_ratio_current_x96: U256,
    sqrt_ratio_target_x96: U256,
    liquidity: u128,
    amount_remaining: I256,
    fee_pips: u32,
) -> Result<SwapStep, PoolError> {
    let zero_for_one = sqrt_ratio_current_x96 >= sqrt_ratio_target_x96;
    let exact_in = amount_remaining >= I256::ZERO;

    let sqrt_ratio_next_x96: U256;
    let mut amount_in = U256::ZERO;
    let mut amount_out = U256::ZERO;

    if exact_in {
        let amount_remaining_less_fee = mul_div(
            i256_to_u256(amount_remaining),
            U256::from(1_000_000u32 - fee_pips),
            U256::from(1_000_000u32),
        )?;

        amount_in = if zero_for_one {
            get_amount_0_delta_unsigned(
                sqrt_ratio_target_x96,
                sqrt_ratio_current_x96,
                liquidity,
                true,
            )?
        } else {
            get_amount_1_delta_unsigned(
                sqrt_ratio_current_x96,
                sqrt_ratio_target_x96,
                liquidity,
                true,
            )?
        };

        sqrt_ratio_next_x96 = if amount_remaining_less_fee >= amount_in {
            sqrt_ratio_target_x96
        } else {
            get_next_sqrt_price_from_input(
                sqrt_ratio_current_x96,
                liquidity,
                amount_remaining_less_fee,
                zero_for_one,
            )?
        };
    } else {
        amount_out = if zero_for_one {
            get_amount_1_delta_unsigned(
                sqrt_ratio_target_x96,
                sqrt_ratio_current_x96,
                liquidity,
                false,
            )?
        } else {
            get_amount_0_delta_unsigned(
                sqrt_ratio_current_x96,
                sqrt_ratio_target_x96,
                liquidity,
                false,
            )?
        };

        let amount_remaining_neg = i256_to_u256(-amount_remaining);

        sqrt_ratio_next_x96 = if amount_remaining_neg >= amount_out {
            sqrt_ratio_target_x96
        } else {
            get_next_sqrt_price_from_output(
                sqrt_ratio_current_x96,
                liquidity,
                amount_remaining_neg,
                zero_for_one,
            )?
        };
    }

    let max = sqrt_ratio_target_x96 == sqrt_ratio_next_x96;

    if zero_for_one {
        if !max || !exact_in {
            amount_in = get_amount_0_delta_unsigned(
                sqrt_ratio_next_x96,
                sqrt_ratio_current_x96,
                liquidity,
                true,
            )?
        }
        if !max || exact_in {
            amount_out = get_amount_1_delta_unsigned(
                sqrt_ratio_next_x96,
                sqrt_ratio_current_x96,
                liquidity,
                false,
            )?
        }
    } else {
        if !max || !exact_in {
            amount_in = get_amount_1_delta_unsigned(
                sqrt_ratio_current_x96,
                sqrt_ratio_next_x96,
                liquidity,
                true,
            )?
        }
        if !max || exact_in {
            amount_out = get_amount_0_delta_unsigned(
                sqrt_ratio_current_x96,
                sqrt_ratio_next_x96,
                liquidity,
                false,
            )?
        }
    }

    if !exact_in {
        let amount_remaining_neg = i256_to_u256(-amount_remaining);
        if amount_out > amount_remaining_neg {
            amount_out = amount_remaining_neg;
        }
    }

    let fee_amount = if exact_in && sqrt_ratio_next_x96 != sqrt_ratio_target_x96 {
        i256_to_u256(amount_remaining) - amount_in
    } else {
        mul_div_rounding_up(amount_in, U256::from(fee_pips), U256::from(1_000_000u32 - fee_pips))?
    };

    Ok(SwapStep { sqrt_ratio_next_x96, amount_in, amount_out, fee_amount })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ONE;
    use ruint::uint;

    #[test]
    fn exact_in_capped_at_price_target() {
        let price = uint!(79228162514264337593543950336_U256);
        let price_target = uint!(79623317895830914510639640423_U256);
        let liquidity = 2e18 as u128;
        let amount = I256::try_from(1_000_000_000_000_000_000i128).unwrap();
        let fee = 600;

        let step = compute_swap_step(price, price_target, liquidity, amount, fee).unwrap();

        assert_eq!(step.sqrt_ratio_next_x96, price_target);
        assert_eq!(step.amount_in, uint!(9975124224178055_U256));
        assert_eq!(step.fee_amount, uint!(5988667735148_U256));
        assert_eq!(step.amount_out, uint!(9925619580021728_U256));
        assert!(step.amount_in + step.fee_amount < i256_to_u256(amount));
    }

    #[test]
    fn exact_out_capped_at_price_target() {
        let price = uint!(79228162514264337593543950336_U256);
        let price_target = uint!(79623317895830914510639640423_U256);
        let liquidity = 2e18 as u128;
        let amount = I256::try_from(-1_000_000_000_000_000_000i128).unwrap();
        let fee = 600;

        let step = compute_swap_step(price, price_target, liquidity, amount, fee).unwrap();

        assert_eq!(step.amount_in, uint!(9975124224178055_U256));
        assert_eq!(step.fee_amount, uint!(5988667735148_U256));
        assert_eq!(step.amount_out, uint!(9925619580021728_U256));
        assert!(step.amount_out < i256_to_u256(-amount));
    }

    #[test]
    fn entire_input_amount_taken_as_fee() {
        let step = compute_swap_step(
            U256::from(2413u32),
            U256::from(79887613182836312u64),
            1985041575832132834610021537970_u128,
            I256::try_from(10i64).unwrap(),
            1872,
        )
        .unwrap();

        assert_eq!(step.amount_in, U256::ZERO);
        assert_eq!(step.fee_amount, U256::from(10u32));
        assert_eq!(step.amount_out, U256::ZERO);
        assert_eq!(step.sqrt_ratio_next_x96, U256::from(2413u32));
    }

    #[test]
    fn amount_out_is_capped_at_desired_amount_out() {
        let step = compute_swap_step(
            uint!(417332158212080721273783715441582_U256),
            uint!(1452870262520218020823638996_U256),
            159344665391607089467575320103_u128,
            I256::try_from(-1i64).unwrap(),
            1,
        )
        .unwrap();

        assert_eq!(step.amount_in, ONE);
        assert_eq!(step.fee_amount, ONE);
        assert_eq!(step.amount_out, ONE);
        assert_eq!(step.sqrt_ratio_next_x96, uint!(417332158212080721273783715441581_U256));
    }

    #[test]
    fn handles_insufficient_liquidity_for_exact_output_zero_for_one() {
        let price = uint!(20282409603651670423947251286016_U256);
        let price_target = price * U256::from(11u32) / U256::from(10u32);
        let liquidity = 1024;
        let amount_remaining = I256::try_from(-4i64).unwrap();
        let fee = 3000;

        let step =
            compute_swap_step(price, price_target, liquidity, amount_remaining, fee).unwrap();

        assert_eq!(step.amount_out, U256::ZERO);
        assert_eq!(step.sqrt_ratio_next_x96, price_target);
        assert_eq!(step.amount_in, U256::from(26215u32));
        assert_eq!(step.fee_amount, U256::from(79u32));
    }
}
