//! Error types for the dapmux core library.

use thiserror::Error;

/// Result type alias using the core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for framing, protocol decoding and configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed Content-Length header or oversized frame
    #[error("Framing error: {0}")]
    Framing(String),

    /// Frame body decoded as JSON but is not a protocol message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
