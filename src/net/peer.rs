//! Per-peer session handling
//!
//! Each connection runs one reader loop and one writer task. Inbound blocks
//! feed the consensus service exactly like locally mined ones; an invalid
//! block is logged and dropped without closing the connection, while a
//! transport or framing failure tears down only this peer.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::consensus::{BlockOrigin, ChainState, RejectReason};
use crate::net::protocol::{self, Message};
use crate::net::PeerSet;

/// Outbound messages queued per peer before backpressure kicks in
const SEND_QUEUE_DEPTH: usize = 32;

/// Which side opened the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Send handle for one connected peer, held in the peer set
#[derive(Debug, Clone)]
pub struct PeerHandle {
    pub addr: SocketAddr,
    tx: mpsc::Sender<Message>,
    session: CancellationToken,
}

impl PeerHandle {
    pub(crate) fn new(addr: SocketAddr, tx: mpsc::Sender<Message>, session: CancellationToken) -> Self {
        Self { addr, tx, session }
    }

    /// Queue a message; `false` means the peer is wedged or gone
    pub fn try_send(&self, msg: Message) -> bool {
        self.tx.try_send(msg).is_ok()
    }

    /// Tear the session down; its tasks exit at the next poll
    pub fn close(&self) {
        self.session.cancel();
    }
}

/// Drive one peer connection until EOF, error, or shutdown
pub async fn run_session(
    stream: TcpStream,
    addr: SocketAddr,
    direction: Direction,
    chain: Arc<ChainState>,
    peers: Arc<PeerSet>,
    cancel: CancellationToken,
) {
    let id = Uuid::new_v4();
    info!(%id, %addr, ?direction, "peer connected");

    // Child of the node token: node shutdown closes every session, and the
    // peer set can close just this one
    let cancel = cancel.child_token();
    let (mut sink, mut frames) = protocol::framed(stream).split();
    let (tx, mut rx) = mpsc::channel::<Message>(SEND_QUEUE_DEPTH);
    peers.insert(id, PeerHandle::new(addr, tx.clone(), cancel.clone()));

    // Writer: drains the queue so a slow peer only blocks itself
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let bytes = match msg.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "dropping unencodable message");
                    continue;
                }
            };
            if sink.send(bytes).await.is_err() {
                break;
            }
        }
    });

    // A dialed peer bootstraps by asking for the remote chain
    if direction == Direction::Outbound {
        let _ = tx.send(Message::FetchChain).await;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        warn!(%id, %addr, error = %e, "peer transport failed");
                        break;
                    }
                    None => {
                        debug!(%id, %addr, "peer closed the connection");
                        break;
                    }
                };
                let msg = match Message::decode(&frame) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(%id, %addr, error = %e, "undecodable frame, dropping peer");
                        break;
                    }
                };
                handle_message(msg, id, &tx, &chain).await;
            }
        }
    }

    peers.remove(id);
    writer.abort();
    info!(%id, %addr, "peer disconnected");
}

/// Apply one inbound message against the local chain
async fn handle_message(
    msg: Message,
    id: Uuid,
    tx: &mpsc::Sender<Message>,
    chain: &Arc<ChainState>,
) {
    match msg {
        Message::NewBlock { block } => {
            let hash = block.hash;
            match chain.try_append(block, BlockOrigin::Peer(id)) {
                Ok(_) => {
                    // Relay to the other peers happens off the accepted feed
                }
                Err(RejectReason::StaleParent) => {
                    debug!(%id, %hash, "peer block has a stale parent, dropping");
                }
                Err(RejectReason::InvalidProofOfWork) => {
                    // Hostile or corrupted; keep the connection, drop the block
                    warn!(%id, %hash, "peer block failed proof of work, dropping");
                }
            }
        }
        Message::FetchChain => {
            let blocks = chain.snapshot();
            if tx.send(Message::SendChain { blocks }).await.is_err() {
                debug!(%id, "peer went away before chain dump");
            }
        }
        Message::SendChain { blocks } => {
            let count = blocks.len();
            match chain.try_adopt(blocks) {
                Ok(height) => info!(%id, height, "bootstrapped from peer chain"),
                Err(reason) => debug!(%id, count, %reason, "ignoring chain dump"),
            }
        }
    }
}
