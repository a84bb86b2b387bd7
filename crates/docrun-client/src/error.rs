//! Error types for the run protocol client.

use thiserror::Error;

/// Errors that can occur while triggering or streaming a run.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Input failed a capability's preconditions; no request was issued.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// HTTP-level failure from the trigger request or stream.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend rejected the request.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The event channel failed before a terminal event arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// Failed to decode a payload.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Local I/O failure (reading an input file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The event subscription was closed before resolution.
    #[error("event channel closed")]
    ChannelClosed,
}
