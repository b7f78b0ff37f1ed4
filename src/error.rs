//! SafeScrub error types

use thiserror::Error;

/// SafeScrub error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cryptographic error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Privacy rule or pipeline error
    #[error("Privacy error: {0}")]
    Privacy(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for SafeScrub operations
pub type Result<T> = std::result::Result<T, Error>;
