//! Error types for the node
//!
//! This module provides the node-wide error handling system using `thiserror`
//! for automatic error trait implementations.

use thiserror::Error;

/// Main error type for the node
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Peer protocol errors (bad frame, oversized message, bad verb)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Network errors
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid difficulty / target construction
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// The nonce space was exhausted without a solution
    #[error("Search exhausted for difficulty {difficulty}")]
    SearchExhausted { difficulty: u32 },
}

/// Result type alias for the node
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create an invalid target error
    pub fn invalid_target(msg: impl Into<String>) -> Self {
        Self::InvalidTarget(msg.into())
    }
}
