//! Ring buffer of cumulative tick / seconds-per-liquidity observations used
//! to reconstruct time-weighted averages. Field naming and the `write`
//! accumulation formulas are grounded on Cass402's `Oracle`/`Observation`;
//! the binary search in `observe_single` has no faithful counterpart in the
//! retrieved examples and is written from the specification directly.

use crate::error::PoolError;
use alloy_primitives::{I256, U256};

pub const MAX_CARDINALITY: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub block_timestamp: u32,
    pub tick_cumulative: I256,
    pub seconds_per_liquidity_cumulative_x128: U256,
    pub initialized: bool,
}

impl Default for Observation {
    fn default() -> Self {
        Self {
            block_timestamp: 0,
            tick_cumulative: I256::ZERO,
            seconds_per_liquidity_cumulative_x128: U256::ZERO,
            initialized: false,
        }
    }
}

impl Observation {
    fn transform(&self, block_timestamp: u32, tick: i32, liquidity: u128) -> Observation {
        let delta = block_timestamp.wrapping_sub(self.block_timestamp);
        let liquidity_divisor = if liquidity == 0 { 1u128 } else { liquidity };

        Observation {
            block_timestamp,
            tick_cumulative: self.tick_cumulative.wrapping_add(
                I256::try_from(tick as i64).unwrap().wrapping_mul(I256::try_from(delta as i64).unwrap()),
            ),
            seconds_per_liquidity_cumulative_x128: self
                .seconds_per_liquidity_cumulative_x128
                .wrapping_add(
                    (U256::from(delta) << 128) / U256::from(liquidity_divisor),
                ),
            initialized: true,
        }
    }
}

/// Returns `true` iff `a <= b`, where both are block timestamps that may have
/// wrapped around `u32`, interpreted relative to `time`.
fn lte(time: u32, a: u32, b: u32) -> bool {
    if a <= time && b <= time {
        return a <= b;
    }
    let a_adjusted = if a > time { a as u64 } else { a as u64 + (1u64 << 32) };
    let b_adjusted = if b > time { b as u64 } else { b as u64 + (1u64 << 32) };
    a_adjusted <= b_adjusted
}

#[derive(Debug, Clone)]
pub struct Oracle {
    observations: Vec<Observation>,
}

impl Oracle {
    pub fn new() -> Self {
        Self { observations: Vec::new() }
    }

    /// Seeds slot 0 with cardinality 1. Called once from `PoolEngine::initialize`.
    pub fn initialize(&mut self, time: u32) -> (u16, u16) {
        self.observations = vec![Observation {
            block_timestamp: time,
            tick_cumulative: I256::ZERO,
            seconds_per_liquidity_cumulative_x128: U256::ZERO,
            initialized: true,
        }];
        (0, 1)
    }

    fn get(&self, index: u16) -> Observation {
        self.observations.get(index as usize).copied().unwrap_or_default()
    }

    /// Appends a new observation iff the current block has not already
    /// written one. Returns the (possibly unchanged) `(index, cardinality)`.
    pub fn write(
        &mut self,
        index: u16,
        time: u32,
        tick: i32,
        liquidity: u128,
        cardinality: u16,
        cardinality_next: u16,
    ) -> (u16, u16) {
        let last = self.get(index);
        if last.block_timestamp == time {
            return (index, cardinality);
        }

        let cardinality_updated =
            if cardinality_next > cardinality && index == cardinality - 1 {
                cardinality_next
            } else {
                cardinality
            };

        let index_updated = (index + 1) % cardinality_updated;
        let new_observation = last.transform(time, tick, liquidity);

        if index_updated as usize >= self.observations.len() {
            self.observations.resize(index_updated as usize + 1, Observation::default());
        }
        self.observations[index_updated as usize] = new_observation;

        (index_updated, cardinality_updated)
    }

    /// Initializes `[current_next, target)` with a sentinel timestamp so the
    /// write path can distinguish them from never-written slots.
    pub fn grow(&mut self, current_next: u16, target: u16) -> u16 {
        if target <= current_next {
            return current_next;
        }
        let target = target.min(MAX_CARDINALITY);
        if self.observations.len() < target as usize {
            self.observations.resize(target as usize, Observation::default());
        }
        for slot in &mut self.observations[current_next as usize..target as usize] {
            slot.block_timestamp = 1;
        }
        target
    }

    fn binary_search(
        &self,
        time: u32,
        target: u32,
        index: u16,
        cardinality: u16,
    ) -> (Observation, Observation) {
        // l/r/i run over an unbounded u32 range so the search never underflows;
        // only the final index into `observations` is reduced mod cardinality.
        let cardinality = cardinality as u32;
        let mut l: u32 = (index as u32 + 1) % cardinality;
        let mut r: u32 = l + cardinality - 1;
        loop {
            let i = (l + r) / 2;
            let before_or_at = self.get((i % cardinality) as u16);

            if !before_or_at.initialized {
                l = i + 1;
                continue;
            }

            let at_or_after = self.get(((i + 1) % cardinality) as u16);
            let target_at_or_after = lte(time, before_or_at.block_timestamp, target);

            if target_at_or_after && lte(time, target, at_or_after.block_timestamp) {
                return (before_or_at, at_or_after);
            }

            if !target_at_or_after {
                r = i - 1;
            } else {
                l = i + 1;
            }
        }
    }

    fn get_surrounding_observations(
        &self,
        time: u32,
        target: u32,
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> Result<(Observation, Observation), PoolError> {
        let newest = self.get(index);

        if lte(time, newest.block_timestamp, target) {
            if newest.block_timestamp == target {
                return Ok((newest, Observation::default()));
            }
            return Ok((newest, newest.transform(target, tick, liquidity)));
        }

        let oldest_index = (index + 1) % cardinality;
        let mut oldest = self.get(oldest_index);
        if !oldest.initialized {
            oldest = self.get(0);
        }

        if !lte(time, oldest.block_timestamp, target) {
            return Err(PoolError::OracleOld);
        }

        Ok(self.binary_search(time, target, index, cardinality))
    }

    /// `secondsAgo = 0` extrapolates from the latest observation using the
    /// live tick/liquidity; otherwise interpolates between the two
    /// observations bracketing `time - secondsAgo`.
    pub fn observe_single(
        &self,
        time: u32,
        seconds_ago: u32,
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> Result<(I256, U256), PoolError> {
        if seconds_ago == 0 {
            let mut last = self.get(index);
            if last.block_timestamp != time {
                last = last.transform(time, tick, liquidity);
            }
            return Ok((last.tick_cumulative, last.seconds_per_liquidity_cumulative_x128));
        }

        let target = time.wrapping_sub(seconds_ago);
        let (before_or_at, at_or_after) =
            self.get_surrounding_observations(time, target, tick, index, liquidity, cardinality)?;

        if target == before_or_at.block_timestamp {
            return Ok((
                before_or_at.tick_cumulative,
                before_or_at.seconds_per_liquidity_cumulative_x128,
            ));
        }
        if target == at_or_after.block_timestamp {
            return Ok((
                at_or_after.tick_cumulative,
                at_or_after.seconds_per_liquidity_cumulative_x128,
            ));
        }

        let observation_time_delta = I256::try_from(
            at_or_after.block_timestamp.wrapping_sub(before_or_at.block_timestamp) as i64,
        )
        .unwrap();
        let target_delta =
            I256::try_from(target.wrapping_sub(before_or_at.block_timestamp) as i64).unwrap();

        let tick_cumulative = before_or_at.tick_cumulative
            + ((at_or_after.tick_cumulative - before_or_at.tick_cumulative)
                / observation_time_delta)
                * target_delta;

        let seconds_per_liquidity_delta = at_or_after
            .seconds_per_liquidity_cumulative_x128
            .wrapping_sub(before_or_at.seconds_per_liquidity_cumulative_x128);
        let seconds_per_liquidity_cumulative_x128 = before_or_at
            .seconds_per_liquidity_cumulative_x128
            .wrapping_add(
                (seconds_per_liquidity_delta * U256::from(target_delta.unsigned_abs()))
                    / U256::from(observation_time_delta.unsigned_abs()),
            );

        Ok((tick_cumulative, seconds_per_liquidity_cumulative_x128))
    }

    pub fn observe(
        &self,
        time: u32,
        seconds_agos: &[u32],
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> Result<Vec<(I256, U256)>, PoolError> {
        seconds_agos
            .iter()
            .map(|&s| self.observe_single(time, s, tick, index, liquidity, cardinality))
            .collect()
    }
}

impl Default for Oracle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_seeds_single_observation() {
        let mut oracle = Oracle::new();
        let (index, cardinality) = oracle.initialize(100);
        assert_eq!((index, cardinality), (0, 1));
        assert_eq!(oracle.get(0).block_timestamp, 100);
    }

    #[test]
    fn write_is_a_noop_within_the_same_block() {
        let mut oracle = Oracle::new();
        oracle.initialize(100);
        let result = oracle.write(0, 100, 5, 1_000, 1, 1);
        assert_eq!(result, (0, 1));
    }

    #[test]
    fn write_accumulates_tick_cumulative() {
        let mut oracle = Oracle::new();
        oracle.initialize(0);
        oracle.grow(1, 2);
        let (index, cardinality) = oracle.write(0, 10, 100, 1_000, 2, 2);
        assert_eq!((index, cardinality), (1, 2));
        // tick * elapsed seconds since the prior write
        assert_eq!(oracle.get(1).tick_cumulative, I256::try_from(1_000i64).unwrap());
    }

    #[test]
    fn grow_is_idempotent() {
        let mut oracle = Oracle::new();
        oracle.initialize(0);
        let once = oracle.grow(1, 5);
        let twice = oracle.grow(once, 5);
        assert_eq!(once, twice);
    }

    #[test]
    fn observe_zero_seconds_ago_extrapolates_from_latest() {
        let mut oracle = Oracle::new();
        oracle.initialize(0);
        let (tick_cumulative, _) = oracle.observe_single(10, 0, 5, 0, 1_000, 1).unwrap();
        assert_eq!(tick_cumulative, I256::try_from(50i64).unwrap());
    }

    #[test]
    fn observe_older_than_oldest_fails() {
        let oracle = Oracle::new();
        let err = oracle.observe_single(10, 100, 0, 0, 1_000, 1).unwrap_err();
        assert_eq!(err, PoolError::OracleOld);
    }

    #[test]
    fn twap_matches_piecewise_linear_reconstruction() {
        let mut oracle = Oracle::new();
        oracle.initialize(0);
        oracle.grow(1, 3);
        let (i1, c1) = oracle.write(0, 10, 0, 1_000, 3, 3);
        let (i2, c2) = oracle.write(i1, 30, 100, 1_000, c1, 3);

        let (tc_25, _) = oracle.observe_single(30, 5, 50, i2, 1_000, c2).unwrap();
        let (tc_0, _) = oracle.observe_single(30, 30, 50, i2, 1_000, c2).unwrap();

        let twap = (tc_25 - tc_0) / I256::try_from(25i64).unwrap();
        // 10s at tick 0, then 15s at tick 100 within [0,25]
        assert_eq!(twap, I256::try_from(70i64).unwrap());
    }
}
