//! Fault injection for [`MemoryCouch`](crate::MemoryCouch).
//!
//! A fault replaces the next matching request's real response: either the
//! exchange fails at the transport level or a canned response is returned
//! whose body can end cleanly, fail mid-way or never end.

use crate::server::StreamGuard;
use bytes::Bytes;
use couchwire_client::{Error, HttpResponse};
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::StatusCode;

/// How a canned body ends after its chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyEnd {
    /// The body ends normally.
    Close,
    /// Reading fails with a retryable transport error.
    Error(String),
    /// The body never ends.
    Hang,
}

/// A response served instead of the real one.
#[derive(Debug, Clone)]
pub struct CannedResponse {
    /// Status code.
    pub status: u16,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// Body chunks, delivered one by one.
    pub chunks: Vec<Bytes>,
    /// What happens after the last chunk.
    pub end: BodyEnd,
}

impl CannedResponse {
    /// Creates an empty response that closes normally.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            chunks: Vec::new(),
            end: BodyEnd::Close,
        }
    }

    /// Creates a response with a JSON body.
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status).chunk(body.to_string())
    }

    /// Adds a header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Appends a body chunk.
    pub fn chunk(mut self, chunk: impl Into<Bytes>) -> Self {
        self.chunks.push(chunk.into());
        self
    }

    /// Sets how the body ends.
    pub fn end(mut self, end: BodyEnd) -> Self {
        self.end = end;
        self
    }

    pub(crate) fn into_response(self, guard: StreamGuard) -> HttpResponse {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = HttpResponse::new(status);
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                response = response.with_header(name, value);
            }
        }

        let chunks = stream::iter(self.chunks.into_iter().map(Ok::<_, Error>));
        let body = match self.end {
            BodyEnd::Close => chunks.boxed(),
            BodyEnd::Error(message) => chunks
                .chain(stream::once(async move {
                    Err(Error::transport_retryable(message))
                }))
                .boxed(),
            BodyEnd::Hang => chunks.chain(stream::pending()).boxed(),
        };
        response.with_body(guard.wrap(body))
    }
}

/// A fault to inject.
#[derive(Debug, Clone)]
pub enum Fault {
    /// The exchange fails before any response.
    Transport {
        /// Error message.
        message: String,
        /// Whether the error is reported as retryable.
        retryable: bool,
    },
    /// A canned response is served.
    Respond(CannedResponse),
}

impl Fault {
    /// A retryable transport failure, like a refused connection.
    pub fn connection_refused() -> Self {
        Fault::Transport {
            message: "connection refused".into(),
            retryable: true,
        }
    }

    /// A canned response.
    pub fn respond(response: CannedResponse) -> Self {
        Fault::Respond(response)
    }
}

/// A queued fault, optionally restricted to one path.
#[derive(Debug, Clone)]
pub(crate) struct FaultRule {
    pub(crate) path: Option<String>,
    pub(crate) fault: Fault,
}

impl FaultRule {
    pub(crate) fn matches(&self, path: &str) -> bool {
        self.path.as_deref().map_or(true, |p| p == path)
    }
}
