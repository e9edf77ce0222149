//! Error types for the client.

use bytes::Bytes;
use couchwire_protocol::{ErrorResponse, ProtocolError};
use std::fmt;
use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur talking to the server.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// No response was obtained (connection, TLS, timeout, body read).
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether repeating the call could succeed.
        retryable: bool,
    },

    /// The server answered with a structured error body.
    #[error("couchdb error: {0}")]
    Api(ApiError),

    /// A response or stream body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The server answered with a status the operation does not accept.
    #[error("unexpected status {status} for {method} {path}")]
    UnexpectedStatus {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
        /// Response status code.
        status: u16,
        /// Raw response body.
        body: Bytes,
    },

    /// The request could not be built (bad URL, unserializable body,
    /// failed authentication decoration). Nothing was sent.
    #[error("invalid request: {0}")]
    Request(String),
}

impl Error {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a request construction error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Returns the HTTP status the server answered with, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api(api) => Some(api.status),
            Error::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the server rejected a write for a stale revision.
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Api(api) => api.kind() == ApiErrorKind::Conflict,
            Error::UnexpectedStatus { status, .. } => *status == 409,
            _ => false,
        }
    }

    /// Returns true if the document or database does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Api(api) => api.kind() == ApiErrorKind::NotFound,
            Error::UnexpectedStatus { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// Returns true if repeating the call could succeed.
    ///
    /// The client never retries on its own; this only classifies.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { retryable, .. } => *retryable,
            Error::Api(api) => api.status >= 500,
            Error::UnexpectedStatus { status, .. } => *status >= 500,
            Error::Decode(_) | Error::Request(_) => false,
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Classification of an [`ApiError`] by status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// 400.
    BadRequest,
    /// 401.
    Unauthorized,
    /// 403.
    Forbidden,
    /// 404.
    NotFound,
    /// 409: stale or missing revision.
    Conflict,
    /// 412: e.g. the database already exists.
    PreconditionFailed,
    /// Anything else.
    Other,
}

/// A structured error answered by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code.
    pub status: u16,
    /// Error code from the body, e.g. `conflict`.
    pub error: String,
    /// Reason from the body.
    pub reason: String,
    /// The original response body.
    pub body: Bytes,
}

impl ApiError {
    /// Creates an API error from a parsed body.
    pub fn new(status: u16, response: ErrorResponse, body: Bytes) -> Self {
        Self {
            status,
            error: response.error,
            reason: response.reason,
            body,
        }
    }

    /// Creates an API error for a response that cannot carry a body
    /// (`HEAD`), naming the error after the status.
    pub fn from_status(status: u16) -> Self {
        let (error, reason) = match status {
            400 => ("bad_request", "bad request"),
            401 => ("unauthorized", "unauthorized"),
            403 => ("forbidden", "forbidden"),
            404 => ("not_found", "missing"),
            409 => ("conflict", "Document update conflict."),
            412 => ("file_exists", "precondition failed"),
            _ => ("unknown_error", "unknown error"),
        };
        Self {
            status,
            error: error.into(),
            reason: reason.into(),
            body: Bytes::new(),
        }
    }

    /// Classifies the error.
    pub fn kind(&self) -> ApiErrorKind {
        match self.status {
            400 => ApiErrorKind::BadRequest,
            401 => ApiErrorKind::Unauthorized,
            403 => ApiErrorKind::Forbidden,
            404 => ApiErrorKind::NotFound,
            409 => ApiErrorKind::Conflict,
            412 => ApiErrorKind::PreconditionFailed,
            _ => ApiErrorKind::Other,
        }
    }

    /// Returns the original body as text, lossily.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status, self.error, self.reason)
    }
}

impl std::error::Error for ApiError {}
