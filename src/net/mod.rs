//! Peer propagation layer
//!
//! Maintains the connected peer set, accepts inbound connections, dials the
//! configured outbound peers once at startup, and relays every accepted
//! block to all connected peers except the one it came from. Per-peer send
//! failures remove that peer only; delivery to the others proceeds.

pub mod peer;
pub mod protocol;

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::consensus::{BlockOrigin, ChainState};
use crate::error::{Error, Result};
use peer::{Direction, PeerHandle};
use protocol::Message;

/// Registry of currently connected peers
#[derive(Debug, Default)]
pub struct PeerSet {
    peers: DashMap<Uuid, PeerHandle>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: Uuid, handle: PeerHandle) {
        self.peers.insert(id, handle);
    }

    pub fn remove(&self, id: Uuid) {
        self.peers.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Queue a message to every peer except `exclude`
    ///
    /// Peers whose send queue is closed or full are torn out of the set;
    /// one bad peer never blocks delivery to the rest. Returns how many
    /// peers the message was queued to.
    pub fn broadcast(&self, msg: &Message, exclude: Option<Uuid>) -> usize {
        let mut dead = Vec::new();
        let mut delivered = 0;
        for entry in self.peers.iter() {
            if Some(*entry.key()) == exclude {
                continue;
            }
            if entry.value().try_send(msg.clone()) {
                delivered += 1;
            } else {
                dead.push((*entry.key(), entry.value().addr));
            }
        }
        for (id, addr) in dead {
            warn!(%id, %addr, "peer not accepting messages, dropping connection");
            if let Some((_, handle)) = self.peers.remove(&id) {
                handle.close();
            }
        }
        delivered
    }
}

/// Running network stack handles
pub struct Network {
    pub local_addr: SocketAddr,
    pub peers: Arc<PeerSet>,
}

/// Start listener, outbound dials, and the block relay
pub async fn spawn(
    port: u16,
    outbound: Vec<String>,
    chain: Arc<ChainState>,
    cancel: CancellationToken,
) -> Result<Network> {
    let peers = Arc::new(PeerSet::new());

    // Failing to bind is fatal; everything after this is per-peer
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| Error::network(format!("failed to bind port {}: {}", port, e)))?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "listening for peers");

    tokio::spawn(accept_loop(
        listener,
        Arc::clone(&chain),
        Arc::clone(&peers),
        cancel.clone(),
    ));
    tokio::spawn(relay_loop(
        Arc::clone(&chain),
        Arc::clone(&peers),
        cancel.clone(),
    ));

    for addr in outbound {
        tokio::spawn(dial(
            addr,
            Arc::clone(&chain),
            Arc::clone(&peers),
            cancel.clone(),
        ));
    }

    Ok(Network { local_addr, peers })
}

/// Accept inbound peers until shutdown
async fn accept_loop(
    listener: TcpListener,
    chain: Arc<ChainState>,
    peers: Arc<PeerSet>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        tokio::spawn(peer::run_session(
                            stream,
                            addr,
                            Direction::Inbound,
                            Arc::clone(&chain),
                            Arc::clone(&peers),
                            cancel.clone(),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
    debug!("listener stopped");
}

/// Dial one configured peer and run its session
async fn dial(
    addr: String,
    chain: Arc<ChainState>,
    peers: Arc<PeerSet>,
    cancel: CancellationToken,
) {
    match TcpStream::connect(&addr).await {
        Ok(stream) => {
            let remote = stream
                .peer_addr()
                .unwrap_or_else(|_| ([0, 0, 0, 0], 0).into());
            peer::run_session(stream, remote, Direction::Outbound, chain, peers, cancel).await;
        }
        Err(e) => {
            warn!(%addr, error = %e, "failed to dial peer");
        }
    }
}

/// Forward accepted blocks to every peer except their origin
async fn relay_loop(chain: Arc<ChainState>, peers: Arc<PeerSet>, cancel: CancellationToken) {
    let mut accepted = chain.subscribe_accepted();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = accepted.recv() => {
                match event {
                    Ok(event) => {
                        let exclude = match event.origin {
                            BlockOrigin::Peer(id) => Some(id),
                            BlockOrigin::Local => None,
                        };
                        let msg = Message::NewBlock { block: event.block };
                        let delivered = peers.broadcast(&msg, exclude);
                        debug!(height = event.height, delivered, "relayed block");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Drop-oldest policy: acceptance never waits on us
                        warn!(skipped, "relay lagged behind block acceptance");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
    debug!("relay stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::{BlockHash, BlockTemplate};
    use tokio::sync::mpsc;

    fn handle(tx: mpsc::Sender<Message>) -> PeerHandle {
        PeerHandle::new(([127, 0, 0, 1], 0).into(), tx, CancellationToken::new())
    }

    fn sample_message() -> Message {
        Message::NewBlock {
            block: BlockTemplate {
                previous_hash: BlockHash::zero(),
                payload: Vec::new(),
                timestamp: 0,
                difficulty: 1,
            }
            .seal(0),
        }
    }

    #[tokio::test]
    async fn test_broadcast_excludes_origin() {
        let peers = PeerSet::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let origin = Uuid::new_v4();
        let other = Uuid::new_v4();
        peers.insert(origin, handle(tx_a));
        peers.insert(other, handle(tx_b));

        let delivered = peers.broadcast(&sample_message(), Some(origin));
        assert_eq!(delivered, 1);
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_drops_dead_peers_only() {
        let peers = PeerSet::new();
        let (tx_dead, rx_dead) = mpsc::channel(4);
        drop(rx_dead);
        let (tx_live, mut rx_live) = mpsc::channel(4);
        peers.insert(Uuid::new_v4(), handle(tx_dead));
        peers.insert(Uuid::new_v4(), handle(tx_live));

        let delivered = peers.broadcast(&sample_message(), None);
        assert_eq!(delivered, 1);
        assert_eq!(peers.len(), 1);
        assert!(rx_live.try_recv().is_ok());
    }
}
