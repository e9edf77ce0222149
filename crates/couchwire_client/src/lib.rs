//! # couchwire client
//!
//! Async client for the CouchDB HTTP API.
//!
//! This crate provides:
//! - Database lifecycle (create, delete, exists, metadata)
//! - Document get/put/delete/rev with revision tokens
//! - Bulk writes, `_all_docs` and view queries
//! - Regular and administrative user management
//! - Continuous change feeds delivered over a cancellable channel
//! - Pluggable HTTP executor, authentication and request observation
//!
//! ## Revisions
//!
//! Every write needs the current revision of the document. The client
//! never caches revisions: read-modify-write means `get` (or `rev`), then
//! `put`, and handling [`Error::is_conflict`] when someone else won.
//!
//! ```rust,ignore
//! use couchwire_client::{Client, ClientConfig};
//!
//! let client = Client::new(ClientConfig::new("http://127.0.0.1:5984"))?;
//! let db = client.database("playground");
//!
//! let rev = db.put("employee:martin", &json!({"name": "Martin"})).await?;
//! let rev = db.put("employee:martin", &json!({"_rev": rev, "name": "Klaus"})).await?;
//! db.delete("employee:martin", &rev).await?;
//! ```
//!
//! ## Change feeds
//!
//! ```rust,ignore
//! use couchwire_client::FeedOptions;
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let mut feed = db.subscribe(&cancel, FeedOptions::default());
//! while let Some(change) = feed.recv().await {
//!     println!("{} {}", change.seq, change.id);
//! }
//! if let Some(err) = feed.error() {
//!     eprintln!("feed ended: {}", err);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod bulk;
mod client;
mod config;
mod database;
mod databases;
mod document;
mod error;
mod feed;
mod http;
mod trace;
mod transport;
mod users;
mod view;

pub use auth::{AuthError, Authenticator, BasicAuthenticator};
pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, Credentials, DEFAULT_HOST};
pub use database::Database;
pub use databases::DatabaseService;
pub use error::{ApiError, ApiErrorKind, Error, Result};
pub use feed::{Feed, FeedEnd, FeedOptions, FeedState, FeedType};
pub use http::{
    BodyStream, HttpExecutor, HttpRequest, HttpResponse, Request, ReqwestExecutor, ResponseBody,
};
pub use trace::{CallInfo, CallOutcome, CallScope, RequestObserver, TracingObserver};
pub use users::{AdminService, CreateUser, UpdateUser, UserService};
pub use view::QueryOptions;

pub use couchwire_protocol::{
    user_id, BulkRequest, BulkResult, Change, ChangeRev, DatabaseMeta, DesignDocument, Document,
    User, ViewDefinition, ViewResults, ViewRow, USERS_DATABASE,
};
pub use tokio_util::sync::CancellationToken;
