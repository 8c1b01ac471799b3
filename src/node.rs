//! Node wiring
//!
//! Builds the chain state, starts the network stack and the mining loop, and
//! ties their lifetimes to one cancellation token so shutdown abandons an
//! in-flight search and drops peer connections promptly.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::consensus::ChainState;
use crate::error::Result;
use crate::net::{self, PeerSet};
use crate::{miner, APP_NAME, APP_VERSION};

/// A running node
pub struct Node {
    chain: Arc<ChainState>,
    peers: Arc<PeerSet>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    miner: Option<JoinHandle<()>>,
}

impl Node {
    /// Start all node tasks
    pub async fn start(config: Config) -> Result<Self> {
        info!(version = APP_VERSION, "starting {}", APP_NAME);

        let chain = Arc::new(ChainState::new(config.block_interval())?);
        let cancel = CancellationToken::new();

        let network = net::spawn(
            config.network.port,
            config.network.peers.clone(),
            Arc::clone(&chain),
            cancel.clone(),
        )
        .await?;

        let miner = if config.mining.enabled {
            Some(tokio::spawn(miner::run(
                Arc::clone(&chain),
                config.mining.payload.clone().into_bytes(),
                cancel.clone(),
            )))
        } else {
            info!("mining disabled, running as validator/relay only");
            None
        };

        Ok(Self {
            chain,
            peers: network.peers,
            local_addr: network.local_addr,
            cancel,
            miner,
        })
    }

    /// Shared chain state
    pub fn chain(&self) -> Arc<ChainState> {
        Arc::clone(&self.chain)
    }

    /// Currently connected peer count
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// The address the inbound listener actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Cancel all node tasks and wait for the miner to wind down
    pub async fn shutdown(self) {
        info!("shutting down");
        self.cancel.cancel();
        if let Some(miner) = self.miner {
            let _ = miner.await;
        }
    }
}

/// Run a node until interrupted
pub async fn run(config: Config) -> Result<()> {
    let node = Node::start(config).await?;
    tokio::signal::ctrl_c().await?;
    node.shutdown().await;
    Ok(())
}
