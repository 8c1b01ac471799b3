//! Peer wire protocol
//!
//! Messages are JSON bodies carried in length-prefixed frames
//! (`LengthDelimitedCodec`), so message boundaries are unambiguous no matter
//! what bytes a block payload contains. Frames are capped to keep a hostile
//! peer from forcing unbounded buffering.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::core::block::Block;
use crate::error::{Error, Result};

/// Upper bound on a single wire frame
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// One peer-to-peer message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// A newly accepted block offered to the peer
    NewBlock { block: Block },
    /// Request the peer's full chain (bootstrap)
    FetchChain,
    /// Full chain dump, oldest first, in response to `fetch_chain`
    SendChain { blocks: Vec<Block> },
}

impl Message {
    /// Encode into one frame body
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decode one frame body
    pub fn decode(frame: &[u8]) -> Result<Self> {
        serde_json::from_slice(frame)
            .map_err(|e| Error::protocol(format!("bad message frame: {}", e)))
    }
}

/// Wrap a TCP stream in the length-delimited framing used by all peers
pub fn framed(stream: TcpStream) -> Framed<TcpStream, LengthDelimitedCodec> {
    Framed::new(
        stream,
        LengthDelimitedCodec::builder()
            .max_frame_length(MAX_FRAME_BYTES)
            .new_codec(),
    )
}
