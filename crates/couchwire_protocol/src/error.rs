//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while decoding wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A record did not match the expected structure.
    #[error("malformed record: {message}")]
    MalformedRecord {
        /// Description of the problem.
        message: String,
    },

    /// The stream ended in the middle of a record.
    #[error("stream ended with {pending} undecoded bytes")]
    TruncatedStream {
        /// Number of bytes left in the buffer.
        pending: usize,
    },
}

impl ProtocolError {
    /// Creates a malformed record error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed(err.to_string())
    }
}
