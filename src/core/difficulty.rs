//! Difficulty adjustment policy
//!
//! A coarse discrete controller over a recent block window: blocks arriving
//! in under half the target interval raise difficulty by one, blocks taking
//! more than double lower it by one (floor-clamped), anything in between
//! leaves it unchanged.

use std::time::Duration;

use crate::core::block::Block;
use crate::core::target::MAX_DIFFICULTY;

/// Difficulty of the genesis block, also the initial mining difficulty
pub const INITIAL_DIFFICULTY: u32 = 3;

/// Floor below which difficulty never drops
pub const MIN_DIFFICULTY: u32 = 1;

/// Number of recent blocks the controller looks at
pub const DIFFICULTY_WINDOW: usize = 10;

/// Difficulty for the next candidate, from the most recent blocks
///
/// `window` is ordered oldest to newest; the elapsed time between its first
/// and last block is compared against the target interval. With fewer than
/// two blocks there is nothing to measure and the tip difficulty carries
/// over.
pub fn next_difficulty(window: &[Block], target_interval: Duration) -> u32 {
    let Some(newest) = window.last() else {
        return INITIAL_DIFFICULTY;
    };
    let current = newest.difficulty;
    if window.len() < 2 {
        return current;
    }

    let elapsed = newest.timestamp.saturating_sub(window[0].timestamp);
    let target = target_interval.as_secs();

    if elapsed.saturating_mul(2) < target {
        (current + 1).min(MAX_DIFFICULTY)
    } else if elapsed > target.saturating_mul(2) {
        current.saturating_sub(1).max(MIN_DIFFICULTY)
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::{BlockHash, BlockTemplate};

    /// Two-block window whose span is `elapsed` seconds at `difficulty`
    fn window(elapsed: u64, difficulty: u32) -> Vec<Block> {
        let base = 1_700_000_000u64;
        [base, base + elapsed]
            .into_iter()
            .map(|timestamp| {
                BlockTemplate {
                    previous_hash: BlockHash::zero(),
                    payload: Vec::new(),
                    timestamp,
                    difficulty,
                }
                .seal(0)
            })
            .collect()
    }

    const INTERVAL: Duration = Duration::from_secs(10);

    #[test]
    fn test_too_fast_raises() {
        assert_eq!(next_difficulty(&window(4, 5), INTERVAL), 6);
        assert_eq!(next_difficulty(&window(0, 5), INTERVAL), 6);
    }

    #[test]
    fn test_too_slow_lowers() {
        assert_eq!(next_difficulty(&window(21, 5), INTERVAL), 4);
        assert_eq!(next_difficulty(&window(1_000, 5), INTERVAL), 4);
    }

    #[test]
    fn test_band_edges_keep_difficulty() {
        // Exactly half and exactly double are both "in band"
        assert_eq!(next_difficulty(&window(5, 5), INTERVAL), 5);
        assert_eq!(next_difficulty(&window(20, 5), INTERVAL), 5);
        assert_eq!(next_difficulty(&window(10, 5), INTERVAL), 5);
    }

    #[test]
    fn test_floor_clamp() {
        assert_eq!(next_difficulty(&window(100, MIN_DIFFICULTY), INTERVAL), MIN_DIFFICULTY);
    }

    #[test]
    fn test_ceiling_clamp() {
        assert_eq!(next_difficulty(&window(0, MAX_DIFFICULTY), INTERVAL), MAX_DIFFICULTY);
    }

    #[test]
    fn test_short_windows() {
        assert_eq!(next_difficulty(&[], INTERVAL), INITIAL_DIFFICULTY);
        let single = window(0, 7);
        assert_eq!(next_difficulty(&single[..1], INTERVAL), 7);
    }

    #[test]
    fn test_clock_skew_counts_as_fast() {
        // A newest block timestamped before the oldest saturates to zero
        // elapsed, which reads as "too fast"
        let mut w = window(5, 5);
        w[1].timestamp = w[0].timestamp - 100;
        assert_eq!(next_difficulty(&w, INTERVAL), 6);
    }
}
