//! Target type for the proof-of-work threshold
//!
//! The threshold is `2^(256 - difficulty)` with hashes read as 256-bit
//! unsigned big-endian integers. An arbitrary-precision integer carries the
//! full difficulty range: difficulty 0 yields `2^256`, which no 256-bit hash
//! can reach, and difficulty 256 yields 1, met only by the all-zero hash.

use num_bigint::BigUint;
use num_traits::One;
use std::fmt;

use crate::core::block::BlockHash;
use crate::error::{Error, Result};

/// Hash width in bits; difficulties beyond this are meaningless
pub const MAX_DIFFICULTY: u32 = 256;

/// Difficulty threshold a block hash must fall strictly below
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Target(BigUint);

impl Target {
    /// Build the threshold `2^(256 - difficulty)` for a difficulty in `0..=256`
    pub fn from_difficulty(difficulty: u32) -> Result<Self> {
        if difficulty > MAX_DIFFICULTY {
            return Err(Error::invalid_target(format!(
                "difficulty {} exceeds hash width {}",
                difficulty, MAX_DIFFICULTY
            )));
        }
        Ok(Self(BigUint::one() << (MAX_DIFFICULTY - difficulty) as usize))
    }

    /// Check whether a hash, read as a big-endian integer, is strictly below
    /// this threshold
    pub fn is_met_by(&self, hash: &BlockHash) -> bool {
        BigUint::from_bytes_be(hash.as_bytes()) < self.0
    }

    /// The threshold as a big integer
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}
