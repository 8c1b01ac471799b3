//! Ordered, append-only chain container
//!
//! The container itself is passive: it is created with a genesis block and
//! grown only through the consensus service, which owns all mutation. The
//! genesis block is fully deterministic so independently started nodes share
//! the same chain root.

use tracing::debug;

use crate::core::block::{Block, BlockHash, BlockTemplate};
use crate::core::difficulty::INITIAL_DIFFICULTY;
use crate::core::pow::{self, SearchOutcome};
use crate::error::{Error, Result};

/// Fixed payload of the genesis block
pub const GENESIS_PAYLOAD: &[u8] = b"Genesis block";

/// Fixed genesis timestamp; every node derives the identical root from it
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// Ordered sequence of blocks from genesis to tip
#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,
}

impl Chain {
    /// Create a chain holding only the genesis block
    ///
    /// Failure here is fatal for the node; there is no valid chain root to
    /// proceed from.
    pub fn new() -> Result<Self> {
        let genesis = genesis_block()?;
        debug!(hash = %genesis.hash, nonce = genesis.nonce, "genesis sealed");
        Ok(Self {
            blocks: vec![genesis],
        })
    }

    /// Rebuild a chain from already-validated blocks (bootstrap adoption)
    pub(crate) fn from_blocks(blocks: Vec<Block>) -> Self {
        debug_assert!(!blocks.is_empty());
        Self { blocks }
    }

    /// The most recently accepted block
    pub fn tip(&self) -> &Block {
        self.blocks
            .last()
            .expect("chain always holds at least the genesis block")
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// All blocks, oldest first
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// The up-to-`n` most recent blocks, oldest first
    pub fn recent_window(&self, n: usize) -> &[Block] {
        let start = self.blocks.len().saturating_sub(n);
        &self.blocks[start..]
    }

    /// Append a block; callers must have validated it against the tip
    pub(crate) fn push(&mut self, block: Block) {
        debug_assert_eq!(block.previous_hash, self.tip().hash);
        self.blocks.push(block);
    }
}

/// Build and seal the deterministic genesis block
pub fn genesis_block() -> Result<Block> {
    let template = BlockTemplate {
        previous_hash: BlockHash::zero(),
        payload: GENESIS_PAYLOAD.to_vec(),
        timestamp: GENESIS_TIMESTAMP,
        difficulty: INITIAL_DIFFICULTY,
    };
    match pow::search(&template, || false)? {
        SearchOutcome::Found(found) => Ok(template.seal(found.nonce)),
        SearchOutcome::Interrupted => Err(Error::config("genesis search interrupted")),
    }
}

/// Validate a full chain received from a peer
///
/// Checks the expected genesis root, the parent linkage of every adjacent
/// pair, and each block's own proof of work.
pub fn validate_chain(blocks: &[Block], expected_genesis: &Block) -> bool {
    let Some(genesis) = blocks.first() else {
        return false;
    };
    if genesis != expected_genesis {
        return false;
    }
    for pair in blocks.windows(2) {
        if pair[1].previous_hash != pair[0].hash {
            return false;
        }
    }
    blocks.iter().all(pow::verify)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_is_deterministic_and_valid() {
        let a = genesis_block().unwrap();
        let b = genesis_block().unwrap();
        assert_eq!(a, b);
        assert!(a.previous_hash.is_zero());
        assert_eq!(a.payload, GENESIS_PAYLOAD);
        assert_eq!(a.difficulty, INITIAL_DIFFICULTY);
        assert!(pow::verify(&a));
    }

    #[test]
    fn test_new_chain_holds_genesis() {
        let chain = Chain::new().unwrap();
        assert_eq!(chain.len(), 1);
        assert!(!chain.is_empty());
        assert_eq!(chain.tip(), &genesis_block().unwrap());
    }

    #[test]
    fn test_recent_window_bounds() {
        let chain = Chain::new().unwrap();
        assert_eq!(chain.recent_window(10).len(), 1);
        assert_eq!(chain.recent_window(0).len(), 0);
    }

    #[test]
    fn test_validate_chain() {
        let genesis = genesis_block().unwrap();

        // Extend genesis with one properly mined block
        let template = BlockTemplate {
            previous_hash: genesis.hash,
            payload: b"next".to_vec(),
            timestamp: GENESIS_TIMESTAMP + 10,
            difficulty: INITIAL_DIFFICULTY,
        };
        let SearchOutcome::Found(found) = pow::search(&template, || false).unwrap() else {
            panic!("search should not be interrupted");
        };
        let block = template.seal(found.nonce);

        let good = vec![genesis.clone(), block.clone()];
        assert!(validate_chain(&good, &genesis));

        // Empty, wrong root, broken linkage, broken proof of work
        assert!(!validate_chain(&[], &genesis));
        assert!(!validate_chain(&good[1..], &genesis));

        let mut unlinked = good.clone();
        unlinked[1].previous_hash = BlockHash::zero();
        assert!(!validate_chain(&unlinked, &genesis));

        let mut forged = good;
        forged[1].nonce += 1;
        assert!(!validate_chain(&forged, &genesis));
    }
}
