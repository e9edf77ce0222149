//! HTTP exchange types and the executor abstraction.
//!
//! The actual HTTP client is abstracted via [`HttpExecutor`] so callers can
//! bring their own (instrumented clients, loopback servers for tests).
//! [`ReqwestExecutor`] is the default implementation.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use couchwire_protocol::revision;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ETAG};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use url::Url;

/// A request relative to the configured host.
///
/// The path is kept as unencoded segments; the client percent-encodes
/// them when it resolves the absolute URL.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    segments: Vec<String>,
    query: Vec<(String, String)>,
    body: Option<Bytes>,
    streaming: bool,
}

impl Request {
    /// Creates a request for the server root.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            segments: Vec::new(),
            query: Vec::new(),
            body: None,
            streaming: false,
        }
    }

    /// Appends one path segment. Slashes inside it are encoded.
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Appends a document ID.
    ///
    /// `_design/` and `_local/` IDs keep their slash; any other ID is a
    /// single segment.
    pub fn document(self, id: &str) -> Self {
        for prefix in ["_design", "_local"] {
            if let Some(rest) = id
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('/'))
            {
                return self.segment(prefix).segment(rest);
            }
        }
        self.segment(id)
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Sets a raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| Error::request(format!("failed to encode body: {}", e)))?;
        Ok(self.body(body))
    }

    /// Marks the request as a long-lived stream exempt from the call
    /// timeout.
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// Returns the method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the unencoded path, e.g. `/playground/_design/company`.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the query parameters in insertion order.
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// Returns the first value of a query parameter.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the body, if any.
    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Returns true for long-lived streams.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub(crate) fn into_body(self) -> Option<Bytes> {
        self.body
    }
}

/// A fully resolved request handed to an [`HttpExecutor`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Option<Bytes>,
    /// Timeout for the whole exchange. `None` for streams.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Returns a header as text.
    pub fn header(&self, name: impl reqwest::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A stream of body chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// A response body, possibly still arriving.
pub struct ResponseBody {
    stream: BodyStream,
}

impl ResponseBody {
    /// An empty body.
    pub fn empty() -> Self {
        Self::from_stream(stream::empty())
    }

    /// A body that is already complete.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::from_stream(stream::iter(vec![Ok(bytes.into())]))
    }

    /// A body produced by a stream of chunks.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            stream: stream.boxed(),
        }
    }

    /// Reads the whole body.
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Reads the whole body and decodes it as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::decode(e.to_string()))
    }

    /// Returns the chunk stream.
    pub fn into_stream(self) -> BodyStream {
        self.stream
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseBody { .. }")
    }
}

/// A response as returned by an [`HttpExecutor`].
#[derive(Debug)]
pub struct HttpResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: ResponseBody,
}

impl HttpResponse {
    /// Creates a response with no headers and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: ResponseBody::empty(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the body.
    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.body = body;
        self
    }

    /// Returns the revision carried in the `ETag` header; empty when the
    /// header is absent.
    pub fn revision(&self) -> String {
        let etag = self
            .headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        revision(etag)
    }
}

/// Executes a single HTTP exchange.
///
/// Implement this trait to plug in a different HTTP stack. Return
/// [`Error::Transport`] when no response could be obtained; any response,
/// whatever its status, is a success at this layer.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    /// Sends the request and returns the response head with a streaming
    /// body.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`HttpExecutor`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    /// Builds a `reqwest` client from the configuration.
    ///
    /// No client-wide timeout is set: it would also cut off change feeds.
    /// Call timeouts travel on each [`HttpRequest`].
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::request(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wraps an existing `reqwest` client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    let retryable = err.is_timeout() || err.is_connect() || err.is_request() || err.is_body();
    Error::Transport {
        message: err.to_string(),
        retryable,
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(transport_error));

        Ok(HttpResponse {
            status,
            headers,
            body: ResponseBody::from_stream(stream),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_paths() {
        let request = Request::new(Method::GET).segment("db").document("employee:michael");
        assert_eq!(request.segments(), ["db", "employee:michael"]);

        let request = Request::new(Method::GET).segment("db").document("_design/company");
        assert_eq!(request.segments(), ["db", "_design", "company"]);
        assert_eq!(request.path(), "/db/_design/company");

        let request = Request::new(Method::GET).segment("db").document("_local/checkpoint");
        assert_eq!(request.segments(), ["db", "_local", "checkpoint"]);

        let request = Request::new(Method::GET).segment("db").document("a/b");
        assert_eq!(request.segments(), ["db", "a/b"]);

        let request = Request::new(Method::GET).segment("db").document("_designer");
        assert_eq!(request.segments(), ["db", "_designer"]);
    }

    #[test]
    fn query_and_body() {
        let request = Request::new(Method::PUT)
            .segment("db")
            .query("rev", "1-a")
            .query("limit", 10)
            .json(&serde_json::json!({"name": "x"}))
            .unwrap();
        assert_eq!(request.query_value("rev"), Some("1-a"));
        assert_eq!(request.query_value("limit"), Some("10"));
        assert_eq!(request.query_value("missing"), None);
        assert_eq!(request.body_bytes().unwrap().as_ref(), br#"{"name":"x"}"#);
        assert!(!request.is_streaming());
        assert!(request.streaming().is_streaming());
    }

    #[test]
    fn response_revision() {
        let response = HttpResponse::new(StatusCode::CREATED)
            .with_header(ETAG, HeaderValue::from_static("\"1-62bc\""));
        assert_eq!(response.revision(), "1-62bc");
        assert_eq!(HttpResponse::new(StatusCode::OK).revision(), "");
    }

    #[tokio::test]
    async fn body_collects_chunks() {
        let body = ResponseBody::from_stream(stream::iter(vec![
            Ok(Bytes::from_static(b"{\"a\":")),
            Ok(Bytes::from_static(b"1}")),
        ]));
        let value: serde_json::Value = body.json().await.unwrap();
        assert_eq!(value["a"], 1);
    }

    #[tokio::test]
    async fn body_errors_propagate() {
        let body = ResponseBody::from_stream(stream::iter(vec![
            Ok(Bytes::from_static(b"{")),
            Err(Error::transport_retryable("connection reset")),
        ]));
        assert!(matches!(body.bytes().await, Err(Error::Transport { .. })));
    }

    #[tokio::test]
    async fn invalid_json_is_a_decode_error() {
        let body = ResponseBody::from_bytes("<html>");
        let result: Result<serde_json::Value> = body.json().await;
        assert!(matches!(result, Err(Error::Decode(_))));
    }
}
