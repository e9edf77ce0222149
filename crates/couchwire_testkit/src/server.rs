//! An in-memory CouchDB behind the [`HttpExecutor`] seam.
//!
//! [`MemoryCouch`] answers the HTTP API the client uses: databases,
//! documents with revisions and conflicts, `_all_docs`, views backed by
//! Rust map functions, `_bulk_docs`, `_users`, `/_config/admins` and a live
//! continuous `_changes` stream. Requests never leave the process.

use crate::changes::{self, ChangesParams};
use crate::faults::{Fault, FaultRule};
use crate::store::{MapFn, Reply, RowQuery, Store};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use couchwire_client::{
    BodyStream, Error, HttpExecutor, HttpRequest, HttpResponse, ResponseBody, Result,
};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, ETAG};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// A request as seen by the server.
#[derive(Debug, Clone)]
pub struct LoggedRequest {
    /// Request method.
    pub method: Method,
    /// Decoded path, e.g. `/playground/a/b` for an ID `a/b`.
    pub path: String,
    /// Decoded path segments.
    pub segments: Vec<String>,
    /// Decoded query parameters.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Option<Bytes>,
    /// Timeout the client attached.
    pub timeout: Option<Duration>,
}

impl LoggedRequest {
    fn new(request: &HttpRequest) -> Self {
        let segments: Vec<String> = request
            .url
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            method: request.method.clone(),
            path: format!("/{}", segments.join("/")),
            segments,
            query: request.url.query_pairs().into_owned().collect(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            timeout: request.timeout,
        }
    }

    /// Returns the first value of a query parameter.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns a header as text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn json_body(&self) -> std::result::Result<Value, Reply> {
        let body = self.body.as_deref().unwrap_or_default();
        serde_json::from_slice(body).map_err(|_| Reply::bad_request("invalid UTF-8 JSON"))
    }
}

/// Counts a live response body until it is dropped.
pub(crate) struct StreamGuard {
    open: Arc<AtomicUsize>,
}

impl StreamGuard {
    fn new(open: Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self { open }
    }

    /// Ties the guard to a body stream.
    pub(crate) fn wrap<S>(self, stream: S) -> ResponseBody
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        ResponseBody::from_stream(Guarded {
            inner: stream.boxed(),
            _guard: self,
        })
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Guarded {
    inner: BodyStream,
    _guard: StreamGuard,
}

impl Stream for Guarded {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// State shared with running feeds.
pub(crate) struct Shared {
    pub(crate) store: Mutex<Store>,
    pub(crate) updates: watch::Sender<u64>,
    pub(crate) closes: watch::Sender<u64>,
    open_streams: Arc<AtomicUsize>,
    views: Mutex<BTreeMap<(String, String), MapFn>>,
    faults: Mutex<VecDeque<FaultRule>>,
    log: Mutex<Vec<LoggedRequest>>,
    basic_auth: Mutex<Option<String>>,
}

impl Shared {
    pub(crate) fn stream_guard(&self) -> StreamGuard {
        StreamGuard::new(self.open_streams.clone())
    }

    fn notify_update(&self) {
        self.updates.send_modify(|n| *n += 1);
    }
}

/// In-memory CouchDB.
///
/// Cheap to clone; clones share state. Hand it to a client with
/// [`ClientBuilder::executor`](couchwire_client::ClientBuilder::executor).
///
/// Must be used from within a Tokio runtime: `_changes` streams run as
/// background tasks.
#[derive(Clone)]
pub struct MemoryCouch {
    shared: Arc<Shared>,
}

impl Default for MemoryCouch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCouch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCouch")
            .field("databases", &self.databases())
            .field("open_streams", &self.open_streams())
            .finish_non_exhaustive()
    }
}

impl MemoryCouch {
    /// Creates a server holding only the system databases.
    pub fn new() -> Self {
        let (updates, _) = watch::channel(0);
        let (closes, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                store: Mutex::new(Store::new()),
                updates,
                closes,
                open_streams: Arc::new(AtomicUsize::new(0)),
                views: Mutex::new(BTreeMap::new()),
                faults: Mutex::new(VecDeque::new()),
                log: Mutex::new(Vec::new()),
                basic_auth: Mutex::new(None),
            }),
        }
    }

    /// Returns the executor to build a client with.
    pub fn executor(&self) -> Arc<dyn HttpExecutor> {
        Arc::new(self.clone())
    }

    /// Lists database names.
    pub fn databases(&self) -> Vec<String> {
        self.shared.store.lock().database_names()
    }

    /// Creates a database directly, bypassing HTTP.
    pub fn create_database(&self, name: &str) -> bool {
        self.shared.store.lock().create_database(name).status == 201
    }

    /// Returns the current update sequence of a database.
    pub fn update_seq(&self, db: &str) -> Option<u64> {
        self.shared.store.lock().update_seq(db)
    }

    /// Returns a stored document, bypassing HTTP.
    pub fn document(&self, db: &str, id: &str) -> Option<Value> {
        let reply = self.shared.store.lock().get_document(db, id);
        (reply.status == 200).then_some(reply.body)
    }

    /// Writes a document directly, as another client would. Returns the new
    /// revision, or `None` on conflict.
    pub fn put_document(&self, db: &str, id: &str, body: Value) -> Option<String> {
        let reply = self.shared.store.lock().put_document(db, id, body, None);
        if reply.status == 201 {
            self.shared.notify_update();
        }
        reply.etag
    }

    /// Registers a view map function under `_design/{design}/_view/{view}`.
    ///
    /// Queries still need the design document to exist in the database.
    pub fn register_view<F>(&self, design: &str, view: &str, map: F)
    where
        F: Fn(&Value) -> Vec<(Value, Value)> + Send + Sync + 'static,
    {
        self.shared
            .views
            .lock()
            .insert((design.to_string(), view.to_string()), Arc::new(map));
    }

    /// Requires HTTP basic authentication on every request.
    pub fn require_basic_auth(&self, username: &str, password: &str) {
        let token = STANDARD.encode(format!("{}:{}", username, password));
        *self.shared.basic_auth.lock() = Some(format!("Basic {}", token));
    }

    /// Queues a fault for the next request.
    pub fn inject(&self, fault: Fault) {
        self.shared
            .faults
            .lock()
            .push_back(FaultRule { path: None, fault });
    }

    /// Queues a fault for the next request to `path` (decoded, e.g.
    /// `/playground/_changes`).
    pub fn inject_at(&self, path: &str, fault: Fault) {
        self.shared.faults.lock().push_back(FaultRule {
            path: Some(path.to_string()),
            fault,
        });
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<LoggedRequest> {
        self.shared.log.lock().clone()
    }

    /// Returns the number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.shared.log.lock().len()
    }

    /// Returns the last request received.
    pub fn last_request(&self) -> Option<LoggedRequest> {
        self.shared.log.lock().last().cloned()
    }

    /// Number of streaming bodies (feeds and canned bodies) the client has
    /// not dropped yet.
    pub fn open_streams(&self) -> usize {
        self.shared.open_streams.load(Ordering::SeqCst)
    }

    /// Waits until [`open_streams`](Self::open_streams) equals `expected`.
    /// Returns false if that does not happen within `within`.
    pub async fn wait_for_open_streams(&self, expected: usize, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if self.open_streams() == expected {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Ends every open `_changes` stream with a `last_seq` record, as the
    /// server does when a feed times out.
    pub fn close_feeds(&self) {
        self.shared.closes.send_modify(|n| *n += 1);
    }

    fn take_fault(&self, path: &str) -> Option<Fault> {
        let mut faults = self.shared.faults.lock();
        let index = faults.iter().position(|rule| rule.matches(path))?;
        faults.remove(index).map(|rule| rule.fault)
    }

    fn authorized(&self, request: &LoggedRequest) -> bool {
        match self.shared.basic_auth.lock().as_deref() {
            Some(expected) => request.header(AUTHORIZATION.as_str()) == Some(expected),
            None => true,
        }
    }

    fn route(&self, request: &LoggedRequest) -> Routed {
        let segments: Vec<&str> = request.segments.iter().map(String::as_str).collect();
        let method = &request.method;

        match segments.as_slice() {
            [] => Routed::Reply(Reply::ok(
                200,
                json!({"couchdb": "Welcome", "version": "3.3.3", "vendor": {"name": "couchwire"}}),
            )),
            ["_all_dbs"] if *method == Method::GET => {
                Routed::Reply(Reply::ok(200, json!(self.databases())))
            }
            ["_config", "admins"] if *method == Method::GET => {
                Routed::Reply(self.shared.store.lock().admins())
            }
            ["_config", "admins", name] => Routed::Reply(self.admin(method, name, request)),
            [db] => Routed::Reply(self.database(method, db)),
            [db, "_all_docs"] if *method == Method::GET => Routed::Reply(
                RowQuery::parse(&request.query)
                    .map(|query| self.shared.store.lock().all_docs(db, &query))
                    .unwrap_or_else(|reply| reply),
            ),
            [db, "_bulk_docs"] if *method == Method::POST => {
                Routed::Reply(match request.json_body() {
                    Ok(body) => self.write(|store| store.bulk_docs(db, body)),
                    Err(reply) => reply,
                })
            }
            [db, "_changes"] if *method == Method::GET => self.changes(db, request),
            [db, "_design", design, "_view", view] if *method == Method::GET => {
                Routed::Reply(self.view(db, design, view, request))
            }
            [db, prefix @ ("_design" | "_local"), name] => {
                let id = format!("{}/{}", prefix, name);
                Routed::Reply(self.route_document(method, db, &id, request))
            }
            [db, id] => Routed::Reply(self.route_document(method, db, id, request)),
            _ => Routed::Reply(Reply::error(404, "not_found", "missing")),
        }
    }

    fn write(&self, op: impl FnOnce(&mut Store) -> Reply) -> Reply {
        let reply = {
            let mut store = self.shared.store.lock();
            op(&mut *store)
        };
        if reply.status < 300 {
            self.shared.notify_update();
        }
        reply
    }

    fn database(&self, method: &Method, db: &str) -> Reply {
        match *method {
            Method::PUT => self.write(|store| store.create_database(db)),
            Method::DELETE => self.write(|store| store.delete_database(db)),
            Method::GET | Method::HEAD => self.shared.store.lock().database_info(db),
            _ => method_not_allowed(),
        }
    }

    fn route_document(
        &self,
        method: &Method,
        db: &str,
        id: &str,
        request: &LoggedRequest,
    ) -> Reply {
        match *method {
            Method::GET | Method::HEAD => self.shared.store.lock().get_document(db, id),
            Method::PUT => match request.json_body() {
                Ok(body) => self.write(|store| {
                    store.put_document(db, id, body, request.query_value("rev"))
                }),
                Err(reply) => reply,
            },
            Method::DELETE => {
                self.write(|store| store.delete_document(db, id, request.query_value("rev")))
            }
            _ => method_not_allowed(),
        }
    }

    fn view(&self, db: &str, design: &str, view: &str, request: &LoggedRequest) -> Reply {
        let query = match RowQuery::parse(&request.query) {
            Ok(query) => query,
            Err(reply) => return reply,
        };
        let map = self
            .shared
            .views
            .lock()
            .get(&(design.to_string(), view.to_string()))
            .cloned();
        let store = self.shared.store.lock();
        if !store.has_database(db) {
            return Reply::missing_database();
        }
        match map {
            Some(map) => store.view(db, design, &map, &query),
            None => Reply::error(404, "not_found", "missing_named_view"),
        }
    }

    fn admin(&self, method: &Method, name: &str, request: &LoggedRequest) -> Reply {
        match *method {
            Method::GET => self.shared.store.lock().get_admin(name),
            Method::PUT => match request.json_body() {
                Ok(body) => self.shared.store.lock().put_admin(name, body),
                Err(reply) => reply,
            },
            Method::DELETE => self.shared.store.lock().delete_admin(name),
            _ => method_not_allowed(),
        }
    }

    fn changes(&self, db: &str, request: &LoggedRequest) -> Routed {
        let params = match ChangesParams::parse(&request.query) {
            Ok(params) => params,
            Err(reply) => return Routed::Reply(reply),
        };
        if !self.shared.store.lock().has_database(db) {
            return Routed::Reply(Reply::missing_database());
        }
        Routed::Response(changes::respond(self.shared.clone(), db.to_string(), params))
    }
}

fn method_not_allowed() -> Reply {
    Reply::error(405, "method_not_allowed", "Only GET,HEAD,PUT,DELETE allowed")
}

enum Routed {
    Reply(Reply),
    Response(HttpResponse),
}

pub(crate) fn json_response(reply: Reply, head: bool) -> HttpResponse {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = HttpResponse::new(status)
        .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(rev) = &reply.etag {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", rev)) {
            response = response.with_header(ETAG, value);
        }
    }
    if head {
        return response;
    }
    let mut body = reply.body.to_string();
    body.push('\n');
    response.with_body(ResponseBody::from_bytes(body))
}

#[async_trait]
impl HttpExecutor for MemoryCouch {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let logged = LoggedRequest::new(&request);
        self.shared.log.lock().push(logged.clone());
        debug!(method = %logged.method, path = %logged.path, "memory couch request");

        match self.take_fault(&logged.path) {
            Some(Fault::Transport { message, retryable }) => {
                return Err(Error::Transport { message, retryable });
            }
            Some(Fault::Respond(canned)) => {
                return Ok(canned.into_response(self.shared.stream_guard()));
            }
            None => {}
        }

        let head = logged.method == Method::HEAD;
        if !self.authorized(&logged) {
            return Ok(json_response(
                Reply::error(401, "unauthorized", "Name or password is incorrect."),
                head,
            ));
        }

        Ok(match self.route(&logged) {
            Routed::Reply(reply) => json_response(reply, head),
            Routed::Response(response) => response,
        })
    }
}
