//! Per-owner, per-range liquidity and accrued-fee accounting. Adapted from
//! raydium's `ProcotolPositionState::update`, generalized from its Q64.64
//! reward-only bookkeeping to the engine's Q128.128 fee growth and keyed by
//! an in-memory composite key instead of a derived account address.

use crate::error::PoolError;
use crate::full_math::mul_div;
use alloy_primitives::U256;
use std::collections::HashMap;

pub const Q128: U256 = U256::from_limbs([0, 0, 1, 0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub owner: u64,
    pub lower: i32,
    pub upper: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub liquidity: u128,
    pub fee_growth_inside_0_last_x128: U256,
    pub fee_growth_inside_1_last_x128: U256,
    pub tokens_owed_0: u128,
    pub tokens_owed_1: u128,
}

#[derive(Debug, Default, Clone)]
pub struct PositionLedger {
    positions: HashMap<PositionKey, Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self { positions: HashMap::new() }
    }

    pub fn get(&self, key: PositionKey) -> Position {
        self.positions.get(&key).copied().unwrap_or_default()
    }

    /// Applies `liquidity_delta` and credits fees accrued since the last
    /// snapshot. Rejects a zero-delta "poke" on an empty position.
    pub fn update(
        &mut self,
        key: PositionKey,
        liquidity_delta: i128,
        fee_growth_inside_0_x128: U256,
        fee_growth_inside_1_x128: U256,
    ) -> Result<Position, PoolError> {
        let mut position = self.get(key);

        if liquidity_delta == 0 && position.liquidity == 0 {
            return Err(PoolError::ZeroAmount);
        }

        let liquidity_next = if liquidity_delta == 0 {
            position.liquidity
        } else if liquidity_delta < 0 {
            position
                .liquidity
                .checked_sub(liquidity_delta.unsigned_abs())
                .ok_or(PoolError::LiquidityOverflow)?
        } else {
            position
                .liquidity
                .checked_add(liquidity_delta as u128)
                .ok_or(PoolError::LiquidityOverflow)?
        };

        let fee_growth_delta_0 =
            fee_growth_inside_0_x128.wrapping_sub(position.fee_growth_inside_0_last_x128);
        let fee_growth_delta_1 =
            fee_growth_inside_1_x128.wrapping_sub(position.fee_growth_inside_1_last_x128);

        let owed_delta_0 = mul_div(fee_growth_delta_0, U256::from(position.liquidity), Q128)?;
        let owed_delta_1 = mul_div(fee_growth_delta_1, U256::from(position.liquidity), Q128)?;

        position.liquidity = liquidity_next;
        position.fee_growth_inside_0_last_x128 = fee_growth_inside_0_x128;
        position.fee_growth_inside_1_last_x128 = fee_growth_inside_1_x128;
        // Wraps by contract: callers must collect before tokensOwed would overflow u128.
        position.tokens_owed_0 =
            position.tokens_owed_0.wrapping_add(owed_delta_0.wrapping_to::<u128>());
        position.tokens_owed_1 =
            position.tokens_owed_1.wrapping_add(owed_delta_1.wrapping_to::<u128>());

        self.positions.insert(key, position);
        Ok(position)
    }

    /// Adds principal amounts freed by a burn directly to `tokensOwed`,
    /// bypassing the fee-growth snapshot update `update` performs.
    pub fn credit(&mut self, key: PositionKey, amount_0: u128, amount_1: u128) {
        let mut position = self.get(key);
        position.tokens_owed_0 = position.tokens_owed_0.wrapping_add(amount_0);
        position.tokens_owed_1 = position.tokens_owed_1.wrapping_add(amount_1);
        self.positions.insert(key, position);
    }

    /// Decrements `tokensOwed` by the collected amounts and returns them.
    pub fn collect(
        &mut self,
        key: PositionKey,
        requested_0: u128,
        requested_1: u128,
    ) -> (u128, u128) {
        let mut position = self.get(key);
        let amount_0 = requested_0.min(position.tokens_owed_0);
        let amount_1 = requested_1.min(position.tokens_owed_1);

        position.tokens_owed_0 -= amount_0;
        position.tokens_owed_1 -= amount_1;
        self.positions.insert(key, position);

        (amount_0, amount_1)
    }
}
