//! Continuous mining loop
//!
//! Each cycle builds a candidate against the current tip, searches the nonce
//! space in batches, and submits any solution back to the consensus service.
//! Between batches the loop polls the tip watch so a winning peer block
//! preempts the in-progress search instead of letting it grind on a stale
//! parent, and yields so the search never starves the runtime.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::consensus::{BlockOrigin, ChainState};
use crate::core::block::{BlockHash, BlockTemplate};
use crate::core::pow::{self, Found};
use crate::core::target::Target;
use crate::utils::format_hashrate;

/// How often the miner logs its hash rate
const HASHRATE_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Outcome of one candidate search
enum Cycle {
    Found(Found),
    TipChanged,
    Exhausted,
    Cancelled,
}

/// Run the mining loop until cancelled
///
/// Runs indefinitely during normal operation; rejections (losing a race
/// against a peer block) and search-space exhaustion both restart the cycle
/// with a fresh candidate.
pub async fn run(chain: Arc<ChainState>, payload: Vec<u8>, cancel: CancellationToken) {
    let mut tip_rx = chain.subscribe_tip();
    info!("mining loop started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let template = chain.build_template(payload.clone());
        let parent = template.previous_hash;
        debug!(parent = %parent, difficulty = template.difficulty, "building candidate");

        match search_candidate(&template, parent, &mut tip_rx, &cancel).await {
            Cycle::Found(found) => {
                let block = template.seal(found.nonce);
                match chain.try_append(block, BlockOrigin::Local) {
                    Ok(_) => {
                        // Propagation picks the block up from the accepted
                        // feed; nothing more to do here
                    }
                    Err(reason) => {
                        debug!(%reason, "mined block lost the race, discarding");
                    }
                }
            }
            Cycle::TipChanged => {
                debug!("tip advanced, abandoning search");
            }
            Cycle::Exhausted => {
                warn!(
                    difficulty = template.difficulty,
                    "nonce space exhausted, rebuilding candidate"
                );
            }
            Cycle::Cancelled => break,
        }
    }

    info!("mining loop stopped");
}

/// Search one candidate to completion, preemption, or exhaustion
async fn search_candidate(
    template: &BlockTemplate,
    parent: BlockHash,
    tip_rx: &mut watch::Receiver<BlockHash>,
    cancel: &CancellationToken,
) -> Cycle {
    let target = match Target::from_difficulty(template.difficulty) {
        Ok(target) => target,
        Err(e) => {
            // Difficulty comes from the chain's own policy, so this is a bug
            // rather than input; back off to a fresh candidate
            error!(error = %e, "candidate carried an unusable difficulty");
            return Cycle::Exhausted;
        }
    };

    let started = Instant::now();
    let mut last_report = started;
    let mut hashes = 0u64;
    let mut nonce = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Cycle::Cancelled;
        }
        if *tip_rx.borrow() != parent {
            return Cycle::TipChanged;
        }

        if let Some(found) = pow::search_batch(template, &target, nonce, pow::SEARCH_BATCH_SIZE) {
            debug!(
                nonce = found.nonce,
                hash = %found.hash,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "solution found"
            );
            return Cycle::Found(found);
        }
        hashes += pow::SEARCH_BATCH_SIZE;

        if last_report.elapsed() >= HASHRATE_LOG_INTERVAL {
            let rate = hashes as f64 / started.elapsed().as_secs_f64();
            debug!(rate = %format_hashrate(rate), "mining");
            last_report = Instant::now();
        }

        nonce = match nonce.checked_add(pow::SEARCH_BATCH_SIZE) {
            Some(next) => next,
            None => return Cycle::Exhausted,
        };

        // Keep the runtime responsive; the search is the only CPU-bound task
        tokio::task::yield_now().await;
    }
}
