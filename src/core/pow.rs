//! Proof-of-work search and verification
//!
//! The search walks nonces from zero in fixed-size batches so a caller can
//! poll for preemption between batches without paying a per-hash check.
//! Verification recomputes a single hash, keeping the verify side cheap while
//! the search side stays linear in the difficulty.

use crate::core::block::{Block, BlockHash, BlockTemplate};
use crate::core::target::Target;
use crate::error::{Error, Result};

/// Nonces scanned between preemption checks
pub const SEARCH_BATCH_SIZE: u64 = 2048;

/// A winning nonce and the hash it produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Found {
    pub nonce: u64,
    pub hash: BlockHash,
}

/// Result of a full search run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A qualifying nonce was found
    Found(Found),
    /// The caller's interrupt predicate fired before a solution
    Interrupted,
}

/// Scan `count` nonces starting at `start`, returning the first qualifying one
pub fn search_batch(
    template: &BlockTemplate,
    target: &Target,
    start: u64,
    count: u64,
) -> Option<Found> {
    let mut nonce = start;
    for _ in 0..count {
        let hash = template.hash_with_nonce(nonce);
        if target.is_met_by(&hash) {
            return Some(Found { nonce, hash });
        }
        nonce = match nonce.checked_add(1) {
            Some(n) => n,
            None => return None,
        };
    }
    None
}

/// Search the full nonce space, polling `interrupted` between batches
///
/// Errors if the template's difficulty is out of range or the nonce space is
/// exhausted; the caller recovers from exhaustion by rebuilding the template
/// with a fresh timestamp.
pub fn search<F>(template: &BlockTemplate, mut interrupted: F) -> Result<SearchOutcome>
where
    F: FnMut() -> bool,
{
    let target = Target::from_difficulty(template.difficulty)?;
    let mut start = 0u64;
    loop {
        if interrupted() {
            return Ok(SearchOutcome::Interrupted);
        }
        if let Some(found) = search_batch(template, &target, start, SEARCH_BATCH_SIZE) {
            return Ok(SearchOutcome::Found(found));
        }
        start = match start.checked_add(SEARCH_BATCH_SIZE) {
            Some(next) => next,
            None => {
                return Err(Error::SearchExhausted {
                    difficulty: template.difficulty,
                })
            }
        };
    }
}

/// Verify a sealed block's proof of work from its own stored fields
///
/// Checks that the stored hash matches the recomputed one and that it falls
/// strictly below the threshold for the block's difficulty. A single hash
/// computation, usable on any received block.
pub fn verify(block: &Block) -> bool {
    let Ok(target) = Target::from_difficulty(block.difficulty) else {
        return false;
    };
    let recomputed = block.recompute_hash();
    recomputed == block.hash && target.is_met_by(&recomputed)
}
