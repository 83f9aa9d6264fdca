//! Per-tick liquidity and outside-accumulators. Adapted from the teacher's
//! generic-provider `update`/`cross` methods as implemented in raydium's
//! `TickState`, generalized from Q64.64 reward accounting to the Q128.128
//! fee- and oracle-accumulator set this engine needs.

use crate::error::PoolError;
use crate::tick_math::{MAX_TICK, MIN_TICK};
use alloy_primitives::{I256, U256};
use std::collections::HashMap;

/// Net liquidity change applied when price crosses a tick boundary, plus the
/// accumulator values frozen "on the other side" of it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickInfo {
    pub liquidity_gross: u128,
    pub liquidity_net: i128,
    pub fee_growth_outside_0_x128: U256,
    pub fee_growth_outside_1_x128: U256,
    pub tick_cumulative_outside: I256,
    pub seconds_per_liquidity_outside_x128: U256,
    pub seconds_outside: u32,
    pub initialized: bool,
}

#[derive(Debug, Default, Clone)]
pub struct TickBook {
    ticks: HashMap<i32, TickInfo>,
}

fn add_liquidity_delta(gross: u128, delta: i128) -> Result<u128, PoolError> {
    if delta < 0 {
        gross.checked_sub(delta.unsigned_abs()).ok_or(PoolError::LiquidityOverflow)
    } else {
        gross.checked_add(delta as u128).ok_or(PoolError::LiquidityOverflow)
    }
}

impl TickBook {
    pub fn new() -> Self {
        Self { ticks: HashMap::new() }
    }

    pub fn get(&self, tick: i32) -> TickInfo {
        self.ticks.get(&tick).copied().unwrap_or_default()
    }

    pub fn is_initialized(&self, tick: i32) -> bool {
        self.ticks.get(&tick).map(|t| t.initialized).unwrap_or(false)
    }

    pub fn max_liquidity_per_tick(tick_spacing: i32) -> u128 {
        let min_tick = (MIN_TICK / tick_spacing) * tick_spacing;
        let max_tick = (MAX_TICK / tick_spacing) * tick_spacing;
        let num_ticks = ((max_tick - min_tick) / tick_spacing) as u128 + 1;
        u128::MAX / num_ticks
    }

    /// Adjusts `liquidityGross` by `|delta|`, flips `initialized` if gross
    /// crosses zero, and accumulates `liquidityNet`. Returns whether the
    /// tick flipped (caller must toggle the matching bitmap bit).
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        tick: i32,
        tick_current: i32,
        liquidity_delta: i128,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
        seconds_per_liquidity_cumulative_x128: U256,
        tick_cumulative: I256,
        time: u32,
        upper: bool,
        max_liquidity_per_tick: u128,
    ) -> Result<bool, PoolError> {
        let mut info = self.get(tick);

        let liquidity_gross_before = info.liquidity_gross;
        let liquidity_gross_after = add_liquidity_delta(liquidity_gross_before, liquidity_delta)?;

        if liquidity_gross_after > max_liquidity_per_tick {
            return Err(PoolError::LiquidityOverflow);
        }

        let flipped = (liquidity_gross_after == 0) != (liquidity_gross_before == 0);

        if liquidity_gross_before == 0 {
            // All growth before a tick is initialized is assumed to have happened below it.
            if tick <= tick_current {
                info.fee_growth_outside_0_x128 = fee_growth_global_0_x128;
                info.fee_growth_outside_1_x128 = fee_growth_global_1_x128;
                info.seconds_per_liquidity_outside_x128 = seconds_per_liquidity_cumulative_x128;
                info.tick_cumulative_outside = tick_cumulative;
                info.seconds_outside = time;
            }
            info.initialized = true;
        }

        info.liquidity_gross = liquidity_gross_after;
        info.initialized = liquidity_gross_after != 0;

        info.liquidity_net = if upper {
            info.liquidity_net.checked_sub(liquidity_delta).ok_or(PoolError::LiquidityOverflow)?
        } else {
            info.liquidity_net.checked_add(liquidity_delta).ok_or(PoolError::LiquidityOverflow)?
        };

        self.ticks.insert(tick, info);
        Ok(flipped)
    }

    /// Flips outside-accumulators to `global - outside` and returns the
    /// stored `liquidityNet`.
    pub fn cross(
        &mut self,
        tick: i32,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
        seconds_per_liquidity_cumulative_x128: U256,
        tick_cumulative: I256,
        time: u32,
    ) -> i128 {
        let mut info = self.get(tick);
        info.fee_growth_outside_0_x128 =
            fee_growth_global_0_x128.wrapping_sub(info.fee_growth_outside_0_x128);
        info.fee_growth_outside_1_x128 =
            fee_growth_global_1_x128.wrapping_sub(info.fee_growth_outside_1_x128);
        info.seconds_per_liquidity_outside_x128 = seconds_per_liquidity_cumulative_x128
            .wrapping_sub(info.seconds_per_liquidity_outside_x128);
        info.tick_cumulative_outside = tick_cumulative.wrapping_sub(info.tick_cumulative_outside);
        info.seconds_outside = time.wrapping_sub(info.seconds_outside);

        let liquidity_net = info.liquidity_net;
        self.ticks.insert(tick, info);
        liquidity_net
    }

    /// Decomposes the global accumulator into below/inside/above and returns
    /// the inside portion, all modulo `2^256`.
    pub fn get_fee_growth_inside(
        &self,
        lower: i32,
        upper: i32,
        tick_current: i32,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
    ) -> (U256, U256) {
        let lower_info = self.get(lower);
        let upper_info = self.get(upper);

        let (fee_growth_below_0, fee_growth_below_1) = if tick_current >= lower {
            (lower_info.fee_growth_outside_0_x128, lower_info.fee_growth_outside_1_x128)
        } else {
            (
                fee_growth_global_0_x128.wrapping_sub(lower_info.fee_growth_outside_0_x128),
                fee_growth_global_1_x128.wrapping_sub(lower_info.fee_growth_outside_1_x128),
            )
        };

        let (fee_growth_above_0, fee_growth_above_1) = if tick_current < upper {
            (upper_info.fee_growth_outside_0_x128, upper_info.fee_growth_outside_1_x128)
        } else {
            (
                fee_growth_global_0_x128.wrapping_sub(upper_info.fee_growth_outside_0_x128),
                fee_growth_global_1_x128.wrapping_sub(upper_info.fee_growth_outside_1_x128),
            )
        };

        (
            fee_growth_global_0_x128.wrapping_sub(fee_growth_below_0).wrapping_sub(fee_growth_above_0),
            fee_growth_global_1_x128.wrapping_sub(fee_growth_below_1).wrapping_sub(fee_growth_above_1),
        )
    }

    pub fn clear(&mut self, tick: i32) {
        self.ticks.remove(&tick);
    }

    pub fn check_ticks(lower: i32, upper: i32, tick_spacing: i32) -> Result<(), PoolError> {
        if lower >= upper {
            return Err(PoolError::InvalidTickRange);
        }
        if lower < MIN_TICK || upper > MAX_TICK {
            return Err(PoolError::TickOutOfBounds);
        }
        if lower % tick_spacing != 0 || upper % tick_spacing != 0 {
            return Err(PoolError::TickNotSpaced);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_seeds_outside_when_below_current() {
        let mut book = TickBook::new();
        let max = TickBook::max_liquidity_per_tick(60);
        let flipped = book
            .update(-60, 0, 1_000, U256::from(5u32), U256::from(7u32), U256::ZERO, I256::ZERO, 0, false, max)
            .unwrap();
        assert!(flipped);
        let info = book.get(-60);
        assert_eq!(info.fee_growth_outside_0_x128, U256::from(5u32));
        assert_eq!(info.liquidity_net, 1_000);
    }

    #[test]
    fn update_does_not_seed_when_above_current() {
        let mut book = TickBook::new();
        let max = TickBook::max_liquidity_per_tick(60);
        book.update(60, 0, 1_000, U256::from(5u32), U256::from(7u32), U256::ZERO, I256::ZERO, 0, true, max)
            .unwrap();
        let info = book.get(60);
        assert_eq!(info.fee_growth_outside_0_x128, U256::ZERO);
        assert_eq!(info.liquidity_net, -1_000);
    }

    #[test]
    fn cross_flips_accumulators() {
        let mut book = TickBook::new();
        let max = TickBook::max_liquidity_per_tick(60);
        book.update(60, 0, 1_000, U256::ZERO, U256::ZERO, U256::ZERO, I256::ZERO, 0, false, max).unwrap();
        let net = book.cross(60, U256::from(100u32), U256::from(200u32), U256::ZERO, I256::try_from(10i64).unwrap(), 5);
        assert_eq!(net, 1_000);
        let info = book.get(60);
        assert_eq!(info.fee_growth_outside_0_x128, U256::from(100u32));
    }

    #[test]
    fn fee_growth_inside_identity() {
        let mut book = TickBook::new();
        let max = TickBook::max_liquidity_per_tick(60);
        book.update(-60, 0, 1_000, U256::ZERO, U256::ZERO, U256::ZERO, I256::ZERO, 0, false, max).unwrap();
        book.update(60, 0, 1_000, U256::ZERO, U256::ZERO, U256::ZERO, I256::ZERO, 0, true, max).unwrap();

        let (inside0, _) = book.get_fee_growth_inside(-60, 60, 0, U256::from(1_000u32), U256::ZERO);
        assert_eq!(inside0, U256::from(1_000u32));
    }

    #[test]
    fn rejects_overflowing_tick_range() {
        assert_eq!(TickBook::check_ticks(0, 0, 60), Err(PoolError::InvalidTickRange));
        assert_eq!(TickBook::check_ticks(-60, 50, 60), Err(PoolError::TickNotSpaced));
        assert_eq!(TickBook::check_ticks(MIN_TICK - 60, 60, 60), Err(PoolError::TickOutOfBounds));
    }

    #[test]
    fn liquidity_overflow_is_rejected() {
        let mut book = TickBook::new();
        assert_eq!(
            book.update(0, 0, -1, U256::ZERO, U256::ZERO, U256::ZERO, I256::ZERO, 0, false, 100),
            Err(PoolError::LiquidityOverflow)
        );
    }
}
