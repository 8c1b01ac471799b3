//! Configuration management
//!
//! Settings come from an optional YAML file overlaid by command-line flags
//! and environment variables; flags win over the file, the file wins over
//! built-in defaults.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Command-line arguments
#[derive(Parser, Debug, Default)]
#[clap(
    name = "minichain-node",
    about = "A minimal proof-of-work blockchain node",
    version
)]
pub struct Args {
    /// Configuration file path
    #[clap(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Listen port for inbound peers
    #[clap(short, long, env = "MINICHAIN_PORT")]
    pub port: Option<u16>,

    /// Outbound peer address (host:port); may be repeated
    #[clap(long = "peer", value_name = "ADDR")]
    pub peers: Vec<String>,

    /// Payload stamped into locally mined blocks
    #[clap(long, env = "MINICHAIN_PAYLOAD")]
    pub payload: Option<String>,

    /// Target seconds between blocks, for difficulty adjustment
    #[clap(long, value_name = "SECS")]
    pub block_interval: Option<u64>,

    /// Validate and relay only; do not mine
    #[clap(long)]
    pub no_mine: bool,

    /// Log level filter
    #[clap(short, long, default_value = "info")]
    pub log_level: String,

    /// Log format: plain or json
    #[clap(long, default_value = "plain")]
    pub log_format: String,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Mining configuration
    #[serde(default)]
    pub mining: MiningConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Peer networking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Inbound listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Static outbound peer addresses dialed at startup
    #[serde(default)]
    pub peers: Vec<String>,
}

/// Mining configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Whether this node mines at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Payload stamped into locally mined blocks
    #[serde(default = "default_payload")]
    pub payload: String,

    /// Target seconds between blocks
    #[serde(default = "default_block_interval")]
    pub block_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: plain or json
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_port() -> u16 {
    9444
}

fn default_true() -> bool {
    true
}

fn default_payload() -> String {
    "minichain".to_string()
}

fn default_block_interval() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "plain".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            peers: Vec::new(),
        }
    }
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            payload: default_payload(),
            block_interval_secs: default_block_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            mining: MiningConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Build the effective configuration from parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    Error::config(format!("cannot read {}: {}", path.display(), e))
                })?;
                serde_yaml::from_str(&contents)?
            }
            None => Config::default(),
        };

        if let Some(port) = args.port {
            config.network.port = port;
        }
        if !args.peers.is_empty() {
            config.network.peers = args.peers;
        }
        if let Some(payload) = args.payload {
            config.mining.payload = payload;
        }
        if let Some(secs) = args.block_interval {
            config.mining.block_interval_secs = secs;
        }
        if args.no_mine {
            config.mining.enabled = false;
        }
        config.logging.level = args.log_level;
        config.logging.format = args.log_format;

        config.validate()?;
        Ok(config)
    }

    /// The target block interval as a duration
    pub fn block_interval(&self) -> Duration {
        Duration::from_secs(self.mining.block_interval_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.mining.block_interval_secs == 0 {
            return Err(Error::config("block interval must be at least 1 second"));
        }
        for peer in &self.network.peers {
            if !peer.contains(':') {
                return Err(Error::config(format!(
                    "peer address '{}' is missing a port",
                    peer
                )));
            }
        }
        Ok(())
    }
}
