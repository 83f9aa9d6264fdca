//! The pool state machine: `Slot0`, the global fee accumulators, active
//! liquidity, and the public operations that drive them. Adapted from the
//! teacher's `Math<Provider>`, whose `update`/`simulate_swap` pair is the
//! grounding source for the `CurrentState`/`StepComputations` shape of the
//! swap loop below; here the engine owns its `TickBook`/`TickBitmap`/`Oracle`
//! instead of delegating reads to an external `TicksProvider`, and the swap
//! loop additionally threads fee growth, protocol fee, and oracle writes.

use crate::callback::{PaymentCallback, TokenId, TokenVault};
use crate::error::PoolError;
use crate::full_math::{mul_div, mul_div_rounding_up};
use crate::oracle::Oracle;
use crate::position::{PositionKey, PositionLedger, Q128};
use crate::swap_math::compute_swap_step;
use crate::tick::TickBook;
use crate::tick_bitmap::TickBitmap;
use crate::tick_math::{
    get_sqrt_ratio_at_tick, get_tick_at_sqrt_ratio, MAX_SQRT_RATIO, MAX_TICK, MIN_SQRT_RATIO, MIN_TICK,
};
use crate::utils::{i256_to_u256, u256_to_i256};
use alloy_primitives::{I256, U256};

/// Packed, frequently-read pool state. Mirrors the fields read together on
/// every swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot0 {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub observation_index: u16,
    pub observation_cardinality: u16,
    pub observation_cardinality_next: u16,
    /// Two nibbles: `fee_protocol0 | (fee_protocol1 << 4)`, each `0` or in `[4, 10]`.
    pub fee_protocol: u8,
    pub unlocked: bool,
}

impl Default for Slot0 {
    fn default() -> Self {
        Self {
            sqrt_price_x96: U256::ZERO,
            tick: 0,
            observation_index: 0,
            observation_cardinality: 0,
            observation_cardinality_next: 0,
            fee_protocol: 0,
            unlocked: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolFees {
    pub token0: u128,
    pub token1: u128,
}

/// A single concentrated-liquidity pool. Generic only in the collaborators
/// its mutating calls invoke (`TokenVault`, `PaymentCallback`); the pool's
/// own state is concrete.
#[derive(Debug, Clone)]
pub struct PoolEngine {
    pub token0: TokenId,
    pub token1: TokenId,
    /// The account this pool's own balances are held under in a `TokenVault`.
    pub account: u64,
    pub fee: u32,
    pub tick_spacing: i32,
    pub max_liquidity_per_tick: u128,

    pub slot0: Slot0,
    pub fee_growth_global_0_x128: U256,
    pub fee_growth_global_1_x128: U256,
    pub protocol_fees: ProtocolFees,
    pub liquidity: u128,

    ticks: TickBook,
    bitmap: TickBitmap,
    positions: PositionLedger,
    oracle: Oracle,
}

/// Releases the reentrancy lock on every exit path, including `?`-propagated
/// errors, mirroring the `lock`/`unlock` modifier pair of the original
/// Solidity pool.
///
/// Holds a raw pointer rather than `&'a mut bool` so that the guard's
/// lifetime isn't tied to the enclosing `&mut self` borrow used to obtain it
/// (the guard only ever touches `slot0.unlocked`, never the rest of `self`),
/// letting the locked methods below keep calling other `&mut self` methods
/// and accessing other fields while the guard is alive.
struct LockGuard {
    unlocked: *mut bool,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        unsafe {
            *self.unlocked = true;
        }
    }
}

struct SwapState {
    amount_specified_remaining: I256,
    amount_calculated: I256,
    sqrt_price_x96: U256,
    tick: i32,
    fee_growth_global_x128: U256,
    protocol_fee: u128,
    liquidity: u128,
}

impl PoolEngine {
    pub fn new(
        token0: TokenId,
        token1: TokenId,
        account: u64,
        fee: u32,
        tick_spacing: i32,
    ) -> Result<Self, PoolError> {
        if token0 == token1 {
            return Err(PoolError::InvalidTickRange);
        }
        if tick_spacing <= 0 || tick_spacing >= 16_384 || fee >= 1_000_000 {
            return Err(PoolError::TickNotSpaced);
        }

        Ok(Self {
            token0,
            token1,
            account,
            fee,
            tick_spacing,
            max_liquidity_per_tick: TickBook::max_liquidity_per_tick(tick_spacing),
            slot0: Slot0::default(),
            fee_growth_global_0_x128: U256::ZERO,
            fee_growth_global_1_x128: U256::ZERO,
            protocol_fees: ProtocolFees::default(),
            liquidity: 0,
            ticks: TickBook::new(),
            bitmap: TickBitmap::new(),
            positions: PositionLedger::new(),
            oracle: Oracle::new(),
        })
    }

    fn require_initialized(&self) -> Result<(), PoolError> {
        if self.slot0.sqrt_price_x96.is_zero() {
            Err(PoolError::NotInitialized)
        } else {
            Ok(())
        }
    }

    fn lock(&mut self) -> Result<LockGuard, PoolError> {
        self.require_initialized()?;
        if !self.slot0.unlocked {
            return Err(PoolError::Locked);
        }
        self.slot0.unlocked = false;
        Ok(LockGuard { unlocked: &mut self.slot0.unlocked as *mut bool })
    }

    pub fn initialize(&mut self, sqrt_price_x96: U256, time: u32) -> Result<(), PoolError> {
        if !self.slot0.sqrt_price_x96.is_zero() {
            return Err(PoolError::AlreadyInitialized);
        }
        let tick = get_tick_at_sqrt_ratio(sqrt_price_x96)?;
        let (observation_index, observation_cardinality) = self.oracle.initialize(time);

        self.slot0 = Slot0 {
            sqrt_price_x96,
            tick,
            observation_index,
            observation_cardinality,
            observation_cardinality_next: observation_cardinality,
            fee_protocol: 0,
            unlocked: true,
        };
        tracing::info!(tick, %sqrt_price_x96, "pool initialized");
        Ok(())
    }

    /// Shared kernel for `mint`/`burn`: adjusts both tick endpoints, the
    /// position's liquidity and fee snapshot, and returns the signed token
    /// deltas the caller must settle.
    fn modify_position(
        &mut self,
        owner: u64,
        lower: i32,
        upper: i32,
        liquidity_delta: i128,
        time: u32,
    ) -> Result<(I256, I256), PoolError> {
        TickBook::check_ticks(lower, upper, self.tick_spacing)?;

        let mut flipped_lower = false;
        let mut flipped_upper = false;

        if liquidity_delta != 0 {
            let (tick_cumulative, seconds_per_liquidity_cumulative_x128) =
                self.oracle.observe_single(
                    time,
                    0,
                    self.slot0.tick,
                    self.slot0.observation_index,
                    self.liquidity,
                    self.slot0.observation_cardinality,
                )?;

            flipped_lower = self.ticks.update(
                lower,
                self.slot0.tick,
                liquidity_delta,
                self.fee_growth_global_0_x128,
                self.fee_growth_global_1_x128,
                seconds_per_liquidity_cumulative_x128,
                tick_cumulative,
                time,
                false,
                self.max_liquidity_per_tick,
            )?;
            flipped_upper = self.ticks.update(
                upper,
                self.slot0.tick,
                liquidity_delta,
                self.fee_growth_global_0_x128,
                self.fee_growth_global_1_x128,
                seconds_per_liquidity_cumulative_x128,
                tick_cumulative,
                time,
                true,
                self.max_liquidity_per_tick,
            )?;

            if flipped_lower {
                self.bitmap.flip_tick(lower, self.tick_spacing);
            }
            if flipped_upper {
                self.bitmap.flip_tick(upper, self.tick_spacing);
            }
        }

        let (fee_growth_inside_0_x128, fee_growth_inside_1_x128) = self.ticks.get_fee_growth_inside(
            lower,
            upper,
            self.slot0.tick,
            self.fee_growth_global_0_x128,
            self.fee_growth_global_1_x128,
        );

        let key = PositionKey { owner, lower, upper };
        self.positions.update(
            key,
            liquidity_delta,
            fee_growth_inside_0_x128,
            fee_growth_inside_1_x128,
        )?;

        if liquidity_delta < 0 {
            if flipped_lower {
                self.ticks.clear(lower);
            }
            if flipped_upper {
                self.ticks.clear(upper);
            }
        }

        let (amount0, amount1) = if self.slot0.tick < lower {
            (
                crate::sqrt_price_math::get_amount_0_delta(
                    get_sqrt_ratio_at_tick(lower)?,
                    get_sqrt_ratio_at_tick(upper)?,
                    liquidity_delta,
                )?,
                I256::ZERO,
            )
        } else if self.slot0.tick < upper {
            let amount0 = crate::sqrt_price_math::get_amount_0_delta(
                self.slot0.sqrt_price_x96,
                get_sqrt_ratio_at_tick(upper)?,
                liquidity_delta,
            )?;
            let amount1 = crate::sqrt_price_math::get_amount_1_delta(
                get_sqrt_ratio_at_tick(lower)?,
                self.slot0.sqrt_price_x96,
                liquidity_delta,
            )?;

            self.liquidity = crate::utils::add_liquidity_delta(self.liquidity, liquidity_delta)?;

            let (observation_index, observation_cardinality) = self.oracle.write(
                self.slot0.observation_index,
                time,
                self.slot0.tick,
                self.liquidity,
                self.slot0.observation_cardinality,
                self.slot0.observation_cardinality_next,
            );
            self.slot0.observation_index = observation_index;
            self.slot0.observation_cardinality = observation_cardinality;

            (amount0, amount1)
        } else {
            (
                I256::ZERO,
                crate::sqrt_price_math::get_amount_1_delta(
                    get_sqrt_ratio_at_tick(lower)?,
                    get_sqrt_ratio_at_tick(upper)?,
                    liquidity_delta,
                )?,
            )
        };

        Ok((amount0, amount1))
    }

    /// Adds `amount` liquidity to `[lower, upper)`, invoking `callback` to
    /// collect the tokens owed. Returns the amounts actually charged.
    #[allow(clippy::too_many_arguments)]
    pub fn mint<V: TokenVault, C: PaymentCallback>(
        &mut self,
        vault: &mut V,
        callback: &mut C,
        owner: u64,
        lower: i32,
        upper: i32,
        amount: u128,
        time: u32,
        data: &[u8],
    ) -> Result<(U256, U256), PoolError> {
        if amount == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let _guard = self.lock()?;

        let (amount0, amount1) = self.modify_position(owner, lower, upper, amount as i128, time)?;
        let amount0_u = non_negative(amount0)?;
        let amount1_u = non_negative(amount1)?;

        let balance0_before = vault.balance_of(self.token0, self.account)?;
        let balance1_before = vault.balance_of(self.token1, self.account)?;

        callback.on_mint_payment(amount0_u, amount1_u, data)?;

        if amount0_u > U256::ZERO {
            let balance0_after = vault.balance_of(self.token0, self.account)?;
            if balance0_after < balance0_before + amount0_u {
                return Err(PoolError::InsufficientInputAmount);
            }
        }
        if amount1_u > U256::ZERO {
            let balance1_after = vault.balance_of(self.token1, self.account)?;
            if balance1_after < balance1_before + amount1_u {
                return Err(PoolError::InsufficientInputAmount);
            }
        }

        tracing::info!(owner, lower, upper, amount, "mint");
        Ok((amount0_u, amount1_u))
    }

    /// Removes `amount` liquidity from `[lower, upper)`. The freed principal
    /// is credited to `tokensOwed`, not transferred; call `collect` for that.
    pub fn burn(
        &mut self,
        owner: u64,
        lower: i32,
        upper: i32,
        amount: u128,
        time: u32,
    ) -> Result<(u128, u128), PoolError> {
        let _guard = self.lock()?;

        let (amount0, amount1) = self.modify_position(owner, lower, upper, -(amount as i128), time)?;
        let owed0 = non_positive_abs(amount0)?;
        let owed1 = non_positive_abs(amount1)?;

        if owed0 > 0 || owed1 > 0 {
            self.positions.credit(PositionKey { owner, lower, upper }, owed0, owed1);
        }

        tracing::info!(owner, lower, upper, amount, "burn");
        Ok((owed0, owed1))
    }

    pub fn collect<V: TokenVault>(
        &mut self,
        vault: &mut V,
        owner: u64,
        recipient: u64,
        lower: i32,
        upper: i32,
        amount0_requested: u128,
        amount1_requested: u128,
    ) -> Result<(u128, u128), PoolError> {
        self.require_initialized()?;
        let key = PositionKey { owner, lower, upper };
        let (amount0, amount1) = self.positions.collect(key, amount0_requested, amount1_requested);

        if amount0 > 0 {
            vault.transfer(self.token0, recipient, U256::from(amount0))?;
        }
        if amount1 > 0 {
            vault.transfer(self.token1, recipient, U256::from(amount1))?;
        }

        tracing::info!(owner, lower, upper, amount0, amount1, "collect");
        Ok((amount0, amount1))
    }

    /// Swaps token0 for token1 (`zero_for_one = true`) or vice versa.
    /// `amount_specified > 0` is exact-input, `< 0` exact-output. Stops
    /// early if `sqrt_price_limit_x96` is reached before the amount is
    /// exhausted.
    #[allow(clippy::too_many_arguments)]
    pub fn swap<V: TokenVault, C: PaymentCallback>(
        &mut self,
        vault: &mut V,
        callback: &mut C,
        recipient: u64,
        zero_for_one: bool,
        amount_specified: I256,
        sqrt_price_limit_x96: U256,
        time: u32,
        data: &[u8],
    ) -> Result<(I256, I256), PoolError> {
        let _guard = self.lock()?;

        if amount_specified == I256::ZERO {
            return Err(PoolError::ZeroAmount);
        }

        let slot0_start = self.slot0;

        if zero_for_one {
            if !(sqrt_price_limit_x96 < slot0_start.sqrt_price_x96
                && sqrt_price_limit_x96 > MIN_SQRT_RATIO)
            {
                return Err(PoolError::PriceLimitOutOfRange);
            }
        } else if !(sqrt_price_limit_x96 > slot0_start.sqrt_price_x96
            && sqrt_price_limit_x96 < MAX_SQRT_RATIO)
        {
            return Err(PoolError::PriceLimitOutOfRange);
        }

        let exact_input = amount_specified > I256::ZERO;
        let fee_protocol = if zero_for_one {
            slot0_start.fee_protocol % 16
        } else {
            slot0_start.fee_protocol >> 4
        };

        let mut state = SwapState {
            amount_specified_remaining: amount_specified,
            amount_calculated: I256::ZERO,
            sqrt_price_x96: slot0_start.sqrt_price_x96,
            tick: slot0_start.tick,
            fee_growth_global_x128: if zero_for_one {
                self.fee_growth_global_0_x128
            } else {
                self.fee_growth_global_1_x128
            },
            protocol_fee: 0,
            liquidity: self.liquidity,
        };

        // The accumulators used when crossing a tick only depend on the
        // state *before* the loop started, so they are computed at most once.
        let mut cross_accumulators: Option<(I256, U256)> = None;

        while state.amount_specified_remaining != I256::ZERO
            && state.sqrt_price_x96 != sqrt_price_limit_x96
        {
            let sqrt_price_start_x96 = state.sqrt_price_x96;

            let (mut tick_next, initialized) = self.bitmap.next_initialized_tick_within_one_word(
                state.tick,
                self.tick_spacing,
                zero_for_one,
            )?;
            tick_next = tick_next.clamp(MIN_TICK, MAX_TICK);

            let sqrt_price_next_x96 = get_sqrt_ratio_at_tick(tick_next)?;

            let sqrt_price_target_x96 = if zero_for_one {
                if sqrt_price_next_x96 < sqrt_price_limit_x96 {
                    sqrt_price_limit_x96
                } else {
                    sqrt_price_next_x96
                }
            } else if sqrt_price_next_x96 > sqrt_price_limit_x96 {
                sqrt_price_limit_x96
            } else {
                sqrt_price_next_x96
            };

            let mut step = compute_swap_step(
                state.sqrt_price_x96,
                sqrt_price_target_x96,
                state.liquidity,
                state.amount_specified_remaining,
                self.fee,
            )?;
            state.sqrt_price_x96 = step.sqrt_ratio_next_x96;

            if exact_input {
                state.amount_specified_remaining =
                    state.amount_specified_remaining - u256_to_i256(step.amount_in + step.fee_amount);
                state.amount_calculated = state.amount_calculated - u256_to_i256(step.amount_out);
            } else {
                state.amount_specified_remaining =
                    state.amount_specified_remaining + u256_to_i256(step.amount_out);
                state.amount_calculated =
                    state.amount_calculated + u256_to_i256(step.amount_in + step.fee_amount);
            }

            if fee_protocol > 0 {
                let delta = step.fee_amount / U256::from(fee_protocol as u32);
                step.fee_amount -= delta;
                state.protocol_fee = state.protocol_fee.wrapping_add(delta.wrapping_to::<u128>());
            }

            if state.liquidity > 0 {
                state.fee_growth_global_x128 = state.fee_growth_global_x128.wrapping_add(mul_div(
                    step.fee_amount,
                    Q128,
                    U256::from(state.liquidity),
                )?);
            }

            if state.sqrt_price_x96 == sqrt_price_next_x96 {
                if initialized {
                    if cross_accumulators.is_none() {
                        cross_accumulators = Some(self.oracle.observe_single(
                            time,
                            0,
                            slot0_start.tick,
                            slot0_start.observation_index,
                            self.liquidity,
                            slot0_start.observation_cardinality,
                        )?);
                    }
                    let (tick_cumulative, seconds_per_liquidity_cumulative_x128) =
                        cross_accumulators.unwrap();

                    let (fee_growth_global_0, fee_growth_global_1) = if zero_for_one {
                        (state.fee_growth_global_x128, self.fee_growth_global_1_x128)
                    } else {
                        (self.fee_growth_global_0_x128, state.fee_growth_global_x128)
                    };

                    let mut liquidity_net = self.ticks.cross(
                        tick_next,
                        fee_growth_global_0,
                        fee_growth_global_1,
                        seconds_per_liquidity_cumulative_x128,
                        tick_cumulative,
                        time,
                    );
                    if zero_for_one {
                        liquidity_net = -liquidity_net;
                    }
                    state.liquidity = crate::utils::add_liquidity_delta(state.liquidity, liquidity_net)?;
                }

                state.tick = if zero_for_one { tick_next - 1 } else { tick_next };
            } else if state.sqrt_price_x96 != sqrt_price_start_x96 {
                state.tick = get_tick_at_sqrt_ratio(state.sqrt_price_x96)?;
            }
        }

        if state.tick != slot0_start.tick {
            let (observation_index, observation_cardinality) = self.oracle.write(
                slot0_start.observation_index,
                time,
                slot0_start.tick,
                self.liquidity,
                slot0_start.observation_cardinality,
                slot0_start.observation_cardinality_next,
            );
            self.slot0.sqrt_price_x96 = state.sqrt_price_x96;
            self.slot0.tick = state.tick;
            self.slot0.observation_index = observation_index;
            self.slot0.observation_cardinality = observation_cardinality;
        } else {
            self.slot0.sqrt_price_x96 = state.sqrt_price_x96;
        }

        if self.liquidity != state.liquidity {
            self.liquidity = state.liquidity;
        }

        if zero_for_one {
            self.fee_growth_global_0_x128 = state.fee_growth_global_x128;
            if state.protocol_fee > 0 {
                self.protocol_fees.token0 = self.protocol_fees.token0.wrapping_add(state.protocol_fee);
            }
        } else {
            self.fee_growth_global_1_x128 = state.fee_growth_global_x128;
            if state.protocol_fee > 0 {
                self.protocol_fees.token1 = self.protocol_fees.token1.wrapping_add(state.protocol_fee);
            }
        }

        let (amount0, amount1) = if zero_for_one == exact_input {
            (
                amount_specified - state.amount_specified_remaining,
                state.amount_calculated,
            )
        } else {
            (
                state.amount_calculated,
                amount_specified - state.amount_specified_remaining,
            )
        };

        if zero_for_one {
            if amount1 < I256::ZERO {
                vault.transfer(self.token1, recipient, i256_to_u256(-amount1))?;
            }
            let balance0_before = vault.balance_of(self.token0, self.account)?;
            callback.on_swap_payment(amount0, amount1, data)?;
            if amount0 > I256::ZERO {
                let balance0_after = vault.balance_of(self.token0, self.account)?;
                if balance0_after < balance0_before + i256_to_u256(amount0) {
                    return Err(PoolError::InsufficientInputAmount);
                }
            }
        } else {
            if amount0 < I256::ZERO {
                vault.transfer(self.token0, recipient, i256_to_u256(-amount0))?;
            }
            let balance1_before = vault.balance_of(self.token1, self.account)?;
            callback.on_swap_payment(amount0, amount1, data)?;
            if amount1 > I256::ZERO {
                let balance1_after = vault.balance_of(self.token1, self.account)?;
                if balance1_after < balance1_before + i256_to_u256(amount1) {
                    return Err(PoolError::InsufficientInputAmount);
                }
            }
        }

        tracing::info!(recipient, zero_for_one, %amount0, %amount1, tick = state.tick, "swap");
        Ok((amount0, amount1))
    }

    /// Lends `amount0`/`amount1` against the pool's reserves, charging a fee
    /// of `fee` pips on each, repaid within the same call via `callback`.
    #[allow(clippy::too_many_arguments)]
    pub fn flash<V: TokenVault, C: PaymentCallback>(
        &mut self,
        vault: &mut V,
        callback: &mut C,
        recipient: u64,
        amount0: U256,
        amount1: U256,
        data: &[u8],
    ) -> Result<(), PoolError> {
        let _guard = self.lock()?;
        if self.liquidity == 0 {
            return Err(PoolError::ZeroAmount);
        }

        let fee0 = mul_div_rounding_up(amount0, U256::from(self.fee), U256::from(1_000_000u32))?;
        let fee1 = mul_div_rounding_up(amount1, U256::from(self.fee), U256::from(1_000_000u32))?;

        let balance0_before = vault.balance_of(self.token0, self.account)?;
        let balance1_before = vault.balance_of(self.token1, self.account)?;

        if amount0 > U256::ZERO {
            vault.transfer(self.token0, recipient, amount0)?;
        }
        if amount1 > U256::ZERO {
            vault.transfer(self.token1, recipient, amount1)?;
        }

        callback.on_flash_payment(fee0, fee1, data)?;

        let balance0_after = vault.balance_of(self.token0, self.account)?;
        let balance1_after = vault.balance_of(self.token1, self.account)?;
        if balance0_after < balance0_before + fee0 {
            return Err(PoolError::InsufficientInputAmount);
        }
        if balance1_after < balance1_before + fee1 {
            return Err(PoolError::InsufficientInputAmount);
        }

        let fee_protocol0 = self.slot0.fee_protocol % 16;
        let fee_protocol1 = self.slot0.fee_protocol >> 4;

        let protocol_fee0 = if fee_protocol0 > 0 { fee0 / U256::from(fee_protocol0 as u32) } else { U256::ZERO };
        let protocol_fee1 = if fee_protocol1 > 0 { fee1 / U256::from(fee_protocol1 as u32) } else { U256::ZERO };

        let fee_growth_delta0 = fee0 - protocol_fee0;
        let fee_growth_delta1 = fee1 - protocol_fee1;

        if fee_growth_delta0 > U256::ZERO {
            self.fee_growth_global_0_x128 = self
                .fee_growth_global_0_x128
                .wrapping_add(mul_div(fee_growth_delta0, Q128, U256::from(self.liquidity))?);
        }
        if fee_growth_delta1 > U256::ZERO {
            self.fee_growth_global_1_x128 = self
                .fee_growth_global_1_x128
                .wrapping_add(mul_div(fee_growth_delta1, Q128, U256::from(self.liquidity))?);
        }

        self.protocol_fees.token0 =
            self.protocol_fees.token0.wrapping_add(protocol_fee0.wrapping_to::<u128>());
        self.protocol_fees.token1 =
            self.protocol_fees.token1.wrapping_add(protocol_fee1.wrapping_to::<u128>());

        tracing::info!(recipient, %amount0, %amount1, %fee0, %fee1, "flash");
        Ok(())
    }

    /// Requests that the oracle ring buffer be able to grow to at least
    /// `cardinality_next` slots. A no-op if already at or past that target.
    pub fn grow_oracle(&mut self, cardinality_next: u16) -> Result<(), PoolError> {
        self.require_initialized()?;
        if cardinality_next <= self.slot0.observation_cardinality_next {
            return Ok(());
        }
        let new_next = self.oracle.grow(self.slot0.observation_cardinality_next, cardinality_next);
        self.slot0.observation_cardinality_next = new_next;
        tracing::info!(new_next, "observation cardinality next increased");
        Ok(())
    }

    pub fn observe(&self, time: u32, seconds_agos: &[u32]) -> Result<Vec<(I256, U256)>, PoolError> {
        self.require_initialized()?;
        self.oracle.observe(
            time,
            seconds_agos,
            self.slot0.tick,
            self.slot0.observation_index,
            self.liquidity,
            self.slot0.observation_cardinality,
        )
    }

    /// Tick-cumulative, seconds-per-liquidity-cumulative and seconds, each
    /// restricted to the time the price has spent inside `[lower, upper)`.
    pub fn snapshot_cumulatives_inside(
        &self,
        lower: i32,
        upper: i32,
        time: u32,
    ) -> Result<(I256, U256, u32), PoolError> {
        self.require_initialized()?;
        TickBook::check_ticks(lower, upper, self.tick_spacing)?;

        let lower_info = self.ticks.get(lower);
        let upper_info = self.ticks.get(upper);

        if self.slot0.tick < lower {
            Ok((
                lower_info.tick_cumulative_outside.wrapping_sub(upper_info.tick_cumulative_outside),
                lower_info
                    .seconds_per_liquidity_outside_x128
                    .wrapping_sub(upper_info.seconds_per_liquidity_outside_x128),
                lower_info.seconds_outside.wrapping_sub(upper_info.seconds_outside),
            ))
        } else if self.slot0.tick < upper {
            let (tick_cumulative, seconds_per_liquidity_cumulative_x128) = self.oracle.observe_single(
                time,
                0,
                self.slot0.tick,
                self.slot0.observation_index,
                self.liquidity,
                self.slot0.observation_cardinality,
            )?;
            Ok((
                tick_cumulative
                    .wrapping_sub(lower_info.tick_cumulative_outside)
                    .wrapping_sub(upper_info.tick_cumulative_outside),
                seconds_per_liquidity_cumulative_x128
                    .wrapping_sub(lower_info.seconds_per_liquidity_outside_x128)
                    .wrapping_sub(upper_info.seconds_per_liquidity_outside_x128),
                time.wrapping_sub(lower_info.seconds_outside).wrapping_sub(upper_info.seconds_outside),
            ))
        } else {
            Ok((
                upper_info.tick_cumulative_outside.wrapping_sub(lower_info.tick_cumulative_outside),
                upper_info
                    .seconds_per_liquidity_outside_x128
                    .wrapping_sub(lower_info.seconds_per_liquidity_outside_x128),
                upper_info.seconds_outside.wrapping_sub(lower_info.seconds_outside),
            ))
        }
    }

    pub fn set_protocol_fee(&mut self, fee_protocol0: u8, fee_protocol1: u8) -> Result<(), PoolError> {
        self.require_initialized()?;
        let valid = |f: u8| f == 0 || (4..=10).contains(&f);
        if !valid(fee_protocol0) || !valid(fee_protocol1) {
            return Err(PoolError::InvalidFeeProtocol);
        }
        self.slot0.fee_protocol = fee_protocol0 | (fee_protocol1 << 4);
        tracing::info!(fee_protocol0, fee_protocol1, "protocol fee set");
        Ok(())
    }

    /// Caps each requested amount at what is actually owed, and at
    /// `amount - 1` when that would drain the accumulator to zero: Uniswap's
    /// storage-slot-warmth optimization, kept here for bit-exact parity.
    pub fn collect_protocol<V: TokenVault>(
        &mut self,
        vault: &mut V,
        recipient: u64,
        amount0_requested: u128,
        amount1_requested: u128,
    ) -> Result<(u128, u128), PoolError> {
        self.require_initialized()?;

        let mut amount0 = amount0_requested.min(self.protocol_fees.token0);
        let mut amount1 = amount1_requested.min(self.protocol_fees.token1);

        if amount0 == self.protocol_fees.token0 && amount0 > 0 {
            amount0 -= 1;
        }
        if amount1 == self.protocol_fees.token1 && amount1 > 0 {
            amount1 -= 1;
        }

        self.protocol_fees.token0 -= amount0;
        self.protocol_fees.token1 -= amount1;

        if amount0 > 0 {
            vault.transfer(self.token0, recipient, U256::from(amount0))?;
        }
        if amount1 > 0 {
            vault.transfer(self.token1, recipient, U256::from(amount1))?;
        }

        tracing::info!(recipient, amount0, amount1, "protocol fees collected");
        Ok((amount0, amount1))
    }
}

fn non_negative(amount: I256) -> Result<U256, PoolError> {
    if amount < I256::ZERO {
        Err(PoolError::Overflow)
    } else {
        Ok(i256_to_u256(amount))
    }
}

fn non_positive_abs(amount: I256) -> Result<u128, PoolError> {
    if amount > I256::ZERO {
        Err(PoolError::Overflow)
    } else {
        Ok(i256_to_u256(-amount).wrapping_to::<u128>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct TestVault {
        balances: HashMap<(TokenId, u64), U256>,
    }

    impl TestVault {
        fn credit(&mut self, token: TokenId, account: u64, amount: U256) {
            *self.balances.entry((token, account)).or_insert(U256::ZERO) += amount;
        }
    }

    impl TokenVault for TestVault {
        fn balance_of(&self, token: TokenId, account: u64) -> Result<U256, PoolError> {
            Ok(self.balances.get(&(token, account)).copied().unwrap_or(U256::ZERO))
        }

        fn transfer(&mut self, token: TokenId, to: u64, amount: U256) -> Result<(), PoolError> {
            let from_key = (token, 0u64);
            let bal = self.balances.entry(from_key).or_insert(U256::ZERO);
            *bal = bal.checked_sub(amount).ok_or(PoolError::InsufficientInputAmount)?;
            *self.balances.entry((token, to)).or_insert(U256::ZERO) += amount;
            Ok(())
        }
    }

    /// A counterparty that always settles: the test vault pre-credits the
    /// pool's own account directly, so there is nothing left for the
    /// callback itself to do but acknowledge the debt.
    struct HonestCounterparty;

    impl PaymentCallback for HonestCounterparty {
        fn on_mint_payment(&mut self, _owed_0: U256, _owed_1: U256, _data: &[u8]) -> Result<(), PoolError> {
            Ok(())
        }
        fn on_swap_payment(&mut self, _delta_0: I256, _delta_1: I256, _data: &[u8]) -> Result<(), PoolError> {
            Ok(())
        }
        fn on_flash_payment(&mut self, _fee_0: U256, _fee_1: U256, _data: &[u8]) -> Result<(), PoolError> {
            Ok(())
        }
    }

    fn settled_vault(pool: &PoolEngine) -> TestVault {
        let mut vault = TestVault::default();
        vault.credit(pool.token0, pool.account, U256::from(u128::MAX));
        vault.credit(pool.token1, pool.account, U256::from(u128::MAX));
        vault
    }

    fn pool_at_unit_price() -> PoolEngine {
        let mut pool = PoolEngine::new(0, 1, 0, 3_000, 60).unwrap();
        pool.initialize(U256::from(1u128) << 96, 0).unwrap();
        pool
    }

    #[test]
    fn initialize_rejects_double_init() {
        let mut pool = pool_at_unit_price();
        assert_eq!(
            pool.initialize(U256::from(1u128) << 96, 1),
            Err(PoolError::AlreadyInitialized)
        );
    }

    #[test]
    fn mint_on_full_range_adds_both_tokens_and_active_liquidity() {
        let mut pool = pool_at_unit_price();
        let mut vault = settled_vault(&pool);
        let mut callback = HonestCounterparty;

        let (amount0, amount1) = pool
            .mint(&mut vault, &mut callback, 1, -120, 120, 1_000_000, 0, b"")
            .unwrap();

        assert!(amount0 > U256::ZERO);
        assert!(amount1 > U256::ZERO);
        assert_eq!(pool.liquidity, 1_000_000);
    }

    #[test]
    fn mint_rejects_zero_amount() {
        let mut pool = pool_at_unit_price();
        let mut vault = settled_vault(&pool);
        let mut callback = HonestCounterparty;
        assert_eq!(
            pool.mint(&mut vault, &mut callback, 1, -120, 120, 0, 0, b""),
            Err(PoolError::ZeroAmount)
        );
    }

    #[test]
    fn swap_without_crossing_a_tick_moves_price_and_preserves_liquidity() {
        let mut pool = pool_at_unit_price();
        let mut vault = settled_vault(&pool);
        let mut callback = HonestCounterparty;
        pool.mint(&mut vault, &mut callback, 1, -600, 600, 10_000_000, 0, b"").unwrap();

        let liquidity_before = pool.liquidity;
        let (amount0, amount1) = pool
            .swap(
                &mut vault,
                &mut callback,
                2,
                true,
                I256::try_from(1_000i64).unwrap(),
                MIN_SQRT_RATIO + U256::from(1u8),
                1,
                b"",
            )
            .unwrap();

        assert!(amount0 > I256::ZERO);
        assert!(amount1 < I256::ZERO);
        assert_eq!(pool.liquidity, liquidity_before);
        assert!(pool.slot0.sqrt_price_x96 < U256::from(1u128) << 96);
    }

    #[test]
    fn swap_crossing_an_initialized_tick_updates_active_liquidity() {
        let mut pool = pool_at_unit_price();
        let mut vault = settled_vault(&pool);
        let mut callback = HonestCounterparty;

        // Narrow range just below the starting price, plus a wide backstop so
        // the swap has somewhere to go once it exits the narrow one.
        pool.mint(&mut vault, &mut callback, 1, -120, 0, 5_000_000, 0, b"").unwrap();
        pool.mint(&mut vault, &mut callback, 1, -120_000, 120_000, 5_000_000, 0, b"").unwrap();

        let liquidity_at_start = pool.liquidity;
        pool.swap(
            &mut vault,
            &mut callback,
            2,
            true,
            I256::try_from(5_000_000i64).unwrap(),
            MIN_SQRT_RATIO + U256::from(1u8),
            10,
            b"",
        )
        .unwrap();

        assert!(pool.slot0.tick < -120);
        assert_eq!(pool.liquidity, liquidity_at_start - 5_000_000);
    }

    #[test]
    fn burn_credits_principal_to_tokens_owed_and_collect_pays_it_out() {
        let mut pool = pool_at_unit_price();
        let mut vault = settled_vault(&pool);
        let mut callback = HonestCounterparty;
        pool.mint(&mut vault, &mut callback, 7, -120, 120, 1_000_000, 0, b"").unwrap();

        let (burned0, burned1) = pool.burn(7, -120, 120, 1_000_000, 1).unwrap();
        assert!(burned0 > 0 && burned1 > 0);
        assert_eq!(pool.liquidity, 0);

        let (collected0, collected1) =
            pool.collect(&mut vault, 7, 9, -120, 120, u128::MAX, u128::MAX).unwrap();
        assert_eq!(collected0, burned0);
        assert_eq!(collected1, burned1);
    }

    #[test]
    fn flash_charges_a_fee_and_splits_it_to_protocol_when_configured() {
        let mut pool = pool_at_unit_price();
        let mut vault = settled_vault(&pool);
        let mut callback = HonestCounterparty;
        pool.mint(&mut vault, &mut callback, 1, -600, 600, 1_000_000, 0, b"").unwrap();
        pool.set_protocol_fee(4, 4).unwrap();

        pool.flash(&mut vault, &mut callback, 2, U256::from(1_000u32), U256::from(2_000u32), b"")
            .unwrap();

        assert!(pool.fee_growth_global_0_x128 > U256::ZERO);
        assert!(pool.protocol_fees.token0 > 0);
    }

    #[test]
    fn flash_rejects_when_pool_has_no_liquidity() {
        let mut pool = pool_at_unit_price();
        let mut vault = settled_vault(&pool);
        let mut callback = HonestCounterparty;
        assert_eq!(
            pool.flash(&mut vault, &mut callback, 2, U256::from(1u8), U256::ZERO, b""),
            Err(PoolError::ZeroAmount)
        );
    }

    #[test]
    fn grow_oracle_is_idempotent_below_current_target() {
        let mut pool = pool_at_unit_price();
        pool.grow_oracle(5).unwrap();
        let cardinality_next = pool.slot0.observation_cardinality_next;
        pool.grow_oracle(3).unwrap();
        assert_eq!(pool.slot0.observation_cardinality_next, cardinality_next);
    }

    #[test]
    fn set_protocol_fee_rejects_nibbles_outside_the_allowed_range() {
        let mut pool = pool_at_unit_price();
        assert_eq!(pool.set_protocol_fee(1, 0), Err(PoolError::InvalidFeeProtocol));
        assert_eq!(pool.set_protocol_fee(0, 11), Err(PoolError::InvalidFeeProtocol));
        assert!(pool.set_protocol_fee(5, 0).is_ok());
    }
}
