//! Error types for fleetwatch-core

use thiserror::Error;

/// Main error type for the fleetwatch-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// File watcher error
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Broadcast sink error
    #[error("broadcast error: {0}")]
    Broadcast(String),
}

/// Result type alias for fleetwatch-core
pub type Result<T> = std::result::Result<T, Error>;
