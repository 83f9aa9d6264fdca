//! Sparse bitmap of initialized ticks, keyed by compressed tick (`tick /
//! tick_spacing`). Adapted from the teacher's `tick_bitmap`, which delegated
//! word storage to an external `TicksProvider`; here the bitmap owns its
//! words directly since the pool engine has no external chain state to defer
//! to.

use crate::bit_math;
use crate::error::PoolError;
use alloy_primitives::U256;
use std::collections::HashMap;

/// `tick >> 8` identifies the word, `tick % 256` the bit within it.
pub fn position(tick: i32) -> (i16, u8) {
    ((tick >> 8) as i16, (tick.rem_euclid(256)) as u8)
}

#[derive(Debug, Default, Clone)]
pub struct TickBitmap {
    words: HashMap<i16, U256>,
}

impl TickBitmap {
    pub fn new() -> Self {
        Self { words: HashMap::new() }
    }

    fn word(&self, word_pos: i16) -> U256 {
        self.words.get(&word_pos).copied().unwrap_or(U256::ZERO)
    }

    /// Toggles the initialized bit for `tick` (already compressed by tick
    /// spacing). `tick` must be an exact multiple of `tick_spacing`.
    pub fn flip_tick(&mut self, tick: i32, tick_spacing: i32) {
        debug_assert_eq!(tick % tick_spacing, 0);
        let compressed = tick / tick_spacing;
        let (word_pos, bit_pos) = position(compressed);
        let mask = U256::from(1u8) << bit_pos as usize;
        let word = self.words.entry(word_pos).or_insert(U256::ZERO);
        *word ^= mask;
    }

    /// The next initialized tick in the same word as `tick`, searching left
    /// (`lte = true`) or right (`lte = false`) of it. Returns whether that
    /// tick is actually initialized or merely the boundary of the word.
    pub fn next_initialized_tick_within_one_word(
        &self,
        tick: i32,
        tick_spacing: i32,
        lte: bool,
    ) -> Result<(i32, bool), PoolError> {
        let compressed = crate::tick_math::calculate_compressed(tick, tick_spacing);

        if lte {
            let (word_pos, bit_pos) = position(compressed);
            let mask = (U256::from(1u8) << bit_pos as usize) - U256::from(1u8)
                + (U256::from(1u8) << bit_pos as usize);
            let word = self.word(word_pos);
            let masked = word & mask;
            let initialized = masked != U256::ZERO;

            let next = if initialized {
                (compressed - (bit_pos.overflowing_sub(bit_math::most_significant_bit(masked)?).0) as i32)
                    * tick_spacing
            } else {
                (compressed - bit_pos as i32) * tick_spacing
            };
            Ok((next, initialized))
        } else {
            let (word_pos, bit_pos) = position(compressed + 1);
            let mask = !((U256::from(1u8) << bit_pos as usize) - U256::from(1u8));
            let word = self.word(word_pos);
            let masked = word & mask;
            let initialized = masked != U256::ZERO;

            let next = if initialized {
                (compressed
                    + 1
                    + (bit_math::least_significant_bit(masked)?.overflowing_sub(bit_pos).0) as i32)
                    * tick_spacing
            } else {
                (compressed + 1 + (0xFF - bit_pos) as i32) * tick_spacing
            };
            Ok((next, initialized))
        }
    }
}
