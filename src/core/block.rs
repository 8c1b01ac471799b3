//! Block types and deterministic field hashing
//!
//! A `Block` is immutable once sealed: its `hash` commits to every other
//! field, so any mutation is detectable by recomputing the hash. The hash
//! preimage is a length-prefixed encoding of the fields, identical on every
//! node.

use blake2::{Blake2s256, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Identifying hash of a block (Blake2s-256)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    /// Create a hash from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The all-zero hash, used as the genesis block's parent
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Whether this is the all-zero (genesis parent) hash
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Get the hash as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| Error::protocol(format!("invalid hash hex: {}", e)))?;
        if bytes.len() != 32 {
            return Err(Error::protocol(format!(
                "invalid hash length: expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut array = [0u8; 32];
        array.copy_from_slice(&bytes);
        Ok(Self(array))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for BlockHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for BlockHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BlockHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Hex encoding for opaque payload bytes in JSON messages
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// One sealed unit of the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Creation time, seconds since epoch (informational)
    pub timestamp: u64,
    /// Opaque application payload
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
    /// Hash of the block this one extends; all-zero only for genesis
    pub previous_hash: BlockHash,
    /// Hash of this block over all other fields
    pub hash: BlockHash,
    /// Nonce satisfying the proof-of-work predicate for `difficulty`
    pub nonce: u64,
    /// Leading-zero bits required of `hash` when this block was sealed
    pub difficulty: u32,
}

impl Block {
    /// Recompute the hash from the block's own stored fields
    pub fn recompute_hash(&self) -> BlockHash {
        compute_hash(
            &self.previous_hash,
            &self.payload,
            self.timestamp,
            self.nonce,
            self.difficulty,
        )
    }
}

/// An unsealed candidate block being mined, not yet part of any chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTemplate {
    pub previous_hash: BlockHash,
    pub payload: Vec<u8>,
    pub timestamp: u64,
    pub difficulty: u32,
}

impl BlockTemplate {
    /// Build a candidate extending `previous_hash` with the current time
    pub fn new(previous_hash: BlockHash, payload: Vec<u8>, difficulty: u32) -> Self {
        Self {
            previous_hash,
            payload,
            timestamp: unix_time(),
            difficulty,
        }
    }

    /// Hash of this template under a candidate nonce
    pub fn hash_with_nonce(&self, nonce: u64) -> BlockHash {
        compute_hash(
            &self.previous_hash,
            &self.payload,
            self.timestamp,
            nonce,
            self.difficulty,
        )
    }

    /// Seal the template into an immutable block with the winning nonce
    pub fn seal(self, nonce: u64) -> Block {
        let hash = self.hash_with_nonce(nonce);
        Block {
            timestamp: self.timestamp,
            payload: self.payload,
            previous_hash: self.previous_hash,
            hash,
            nonce,
            difficulty: self.difficulty,
        }
    }
}

/// Deterministic hash over `(previous_hash, payload, timestamp, nonce, difficulty)`
///
/// The payload is length-prefixed so distinct field splits can never collide.
pub fn compute_hash(
    previous_hash: &BlockHash,
    payload: &[u8],
    timestamp: u64,
    nonce: u64,
    difficulty: u32,
) -> BlockHash {
    let mut hasher = Blake2s256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update((payload.len() as u64).to_le_bytes());
    hasher.update(payload);
    hasher.update(timestamp.to_le_bytes());
    hasher.update(nonce.to_le_bytes());
    hasher.update(difficulty.to_le_bytes());
    BlockHash(hasher.finalize().into())
}

/// Current wall-clock time in seconds since the epoch
pub fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
