//! Consensus service: the sole authority over chain mutation
//!
//! All appends, locally mined or received from peers, go through
//! [`ChainState::try_append`] under one write lock, so two candidates racing
//! to extend the same tip resolve to exactly one winner. Acceptance is
//! published on two channels: a `watch` carrying the latest tip hash (the
//! miner's preemption signal; slow readers only ever see the newest value)
//! and a `broadcast` of accepted blocks (the propagation feed; a lagging
//! consumer drops the oldest events rather than stalling acceptance).

use std::time::Duration;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::block::{Block, BlockHash, BlockTemplate};
use crate::core::chain::{self, Chain};
use crate::core::difficulty::{next_difficulty, DIFFICULTY_WINDOW};
use crate::core::pow;
use crate::error::Result;

/// Capacity of the accepted-block broadcast channel
const ACCEPTED_CHANNEL_CAPACITY: usize = 64;

/// Why a candidate block was not appended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// The candidate does not extend the current tip
    #[error("stale or forked parent")]
    StaleParent,
    /// The candidate's hash or nonce does not satisfy its difficulty
    #[error("invalid proof of work")]
    InvalidProofOfWork,
}

/// Why a full-chain dump from a peer was not adopted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdoptReject {
    /// The local chain has already grown past genesis; adopting now would be
    /// fork resolution, which this node does not do
    #[error("local chain already extended")]
    AlreadyExtended,
    /// The received chain does not improve on the local one
    #[error("received chain is not longer")]
    NotLonger,
    /// Root mismatch, broken linkage, or a failing proof of work
    #[error("received chain failed validation")]
    InvalidChain,
}

/// Where an accepted block entered the node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOrigin {
    /// Mined by the local mining loop
    Local,
    /// Received from the identified peer session
    Peer(Uuid),
}

/// A block that passed acceptance, with its provenance
#[derive(Debug, Clone)]
pub struct AcceptedBlock {
    pub block: Block,
    pub origin: BlockOrigin,
    /// Chain length after the append
    pub height: u64,
}

/// Shared chain state guarded by a single-writer critical section
pub struct ChainState {
    chain: RwLock<Chain>,
    tip_tx: watch::Sender<BlockHash>,
    accepted_tx: broadcast::Sender<AcceptedBlock>,
    target_interval: Duration,
}

impl ChainState {
    /// Initialize with a freshly built genesis chain
    ///
    /// Genesis failure is fatal; the node cannot run without a chain root.
    pub fn new(target_interval: Duration) -> Result<Self> {
        let chain = Chain::new()?;
        let (tip_tx, _) = watch::channel(chain.tip().hash);
        let (accepted_tx, _) = broadcast::channel(ACCEPTED_CHANNEL_CAPACITY);
        Ok(Self {
            chain: RwLock::new(chain),
            tip_tx,
            accepted_tx,
            target_interval,
        })
    }

    /// Snapshot of the current tip
    pub fn tip(&self) -> Block {
        self.chain.read().tip().clone()
    }

    /// Current chain length, genesis included
    pub fn height(&self) -> u64 {
        self.chain.read().len() as u64
    }

    /// Full copy of the chain, oldest first (chain exchange)
    pub fn snapshot(&self) -> Vec<Block> {
        self.chain.read().blocks().to_vec()
    }

    /// The genesis block this node was rooted at
    pub fn genesis(&self) -> Block {
        self.chain.read().blocks()[0].clone()
    }

    /// Assemble a mining candidate against a consistent tip snapshot
    ///
    /// Tip hash and difficulty are read under one lock so the candidate can
    /// never mix the tip of one chain state with the difficulty of another.
    pub fn build_template(&self, payload: Vec<u8>) -> BlockTemplate {
        let chain = self.chain.read();
        let difficulty = next_difficulty(chain.recent_window(DIFFICULTY_WINDOW), self.target_interval);
        BlockTemplate::new(chain.tip().hash, payload, difficulty)
    }

    /// Attempt to extend the chain with a candidate block
    ///
    /// Acceptance rules are identical for local and peer blocks: the
    /// candidate must extend the current tip and carry a valid proof of
    /// work. Returns the new chain height on success.
    pub fn try_append(
        &self,
        block: Block,
        origin: BlockOrigin,
    ) -> std::result::Result<u64, RejectReason> {
        let height = {
            let mut chain = self.chain.write();
            if block.previous_hash != chain.tip().hash {
                return Err(RejectReason::StaleParent);
            }
            if !pow::verify(&block) {
                return Err(RejectReason::InvalidProofOfWork);
            }
            chain.push(block.clone());
            chain.len() as u64
        };

        info!(
            height,
            hash = %block.hash,
            nonce = block.nonce,
            difficulty = block.difficulty,
            local = matches!(origin, BlockOrigin::Local),
            "block accepted"
        );
        self.publish(block, origin, height);
        Ok(height)
    }

    /// Adopt a full chain from a peer, bootstrap only
    ///
    /// Only replaces the local chain while it still consists of the genesis
    /// block alone; a node that has accepted any block ignores chain dumps
    /// (fork resolution is out of scope). The received chain must share the
    /// genesis root and validate end to end.
    pub fn try_adopt(&self, blocks: Vec<Block>) -> std::result::Result<u64, AdoptReject> {
        let (tip, origin, height) = {
            let mut chain = self.chain.write();
            if chain.len() > 1 {
                return Err(AdoptReject::AlreadyExtended);
            }
            if blocks.len() <= chain.len() {
                return Err(AdoptReject::NotLonger);
            }
            if !chain::validate_chain(&blocks, chain.tip()) {
                return Err(AdoptReject::InvalidChain);
            }
            *chain = Chain::from_blocks(blocks);
            (
                chain.tip().clone(),
                BlockOrigin::Local,
                chain.len() as u64,
            )
        };

        info!(height, tip = %tip.hash, "adopted bootstrap chain");
        // Publish only the new tip; peers that need more will fetch the chain
        self.publish(tip, origin, height);
        Ok(height)
    }

    /// Subscribe to tip changes (latest value wins)
    pub fn subscribe_tip(&self) -> watch::Receiver<BlockHash> {
        self.tip_tx.subscribe()
    }

    /// Subscribe to accepted blocks for propagation
    pub fn subscribe_accepted(&self) -> broadcast::Receiver<AcceptedBlock> {
        self.accepted_tx.subscribe()
    }

    fn publish(&self, block: Block, origin: BlockOrigin, height: u64) {
        self.tip_tx.send_replace(block.hash);
        // No receivers is fine; propagation may not be up yet
        if self
            .accepted_tx
            .send(AcceptedBlock {
                block,
                origin,
                height,
            })
            .is_err()
        {
            debug!("no propagation subscribers for accepted block");
        }
    }
}
