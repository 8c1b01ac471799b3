//! Minichain Node
//!
//! A minimal proof-of-work blockchain node supporting:
//! - continuous CPU mining against the local chain tip
//! - validation of blocks received from peers
//! - flood propagation of accepted blocks over TCP
//! - best-effort chain exchange for bootstrapping fresh nodes

pub mod config;
pub mod consensus;
pub mod core;
pub mod error;
pub mod miner;
pub mod net;
pub mod node;
pub mod utils;

pub use config::Config;
pub use error::{Error, Result};

/// Application information
pub const APP_NAME: &str = "minichain-node";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
