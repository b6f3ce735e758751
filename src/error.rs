//! Error types for trackwire.

use thiserror::Error;

/// Main error type for all gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while reading listener configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No frame boundary found within the maximum frame size.
    ///
    /// Fail-closed: the connection is torn down, never resynchronized.
    #[error("framing error: {0}")]
    Framing(String),

    /// Malformed or truncated field inside an otherwise complete frame.
    ///
    /// The offending frame is dropped; the connection continues.
    #[error("decode error: {0}")]
    Decode(String),

    /// Hardware identifier not present in the device directory.
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// Position sink / settings store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid listener or protocol configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection closed while writing or reading.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias using GatewayError.
pub type Result<T> = std::result::Result<T, GatewayError>;
