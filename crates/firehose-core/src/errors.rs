//! Error types.

use thiserror::Error;

/// Errors surfaced by firehose setup and configuration paths.
///
/// Per-message paths (send, broadcast, inbound frames) are best effort and
/// never produce these.
#[derive(Debug, Error)]
pub enum FirehoseError {
    /// Trigger options did not match the schema.
    #[error("invalid trigger options: {0}")]
    InvalidOptions(String),
    /// Binding or serving the listener failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for firehose operations.
pub type Result<T> = std::result::Result<T, FirehoseError>;
