//! # couchwire protocol
//!
//! Wire types and codecs for the CouchDB HTTP API.
//!
//! This crate provides:
//! - `Document` identification fields and design documents
//! - The revision codec for `ETag` headers
//! - `Change` records and the incremental `ChangeDecoder`
//! - Database metadata, view results, bulk and user payloads
//! - The `{error, reason}` error body
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bulk;
mod change;
mod database;
mod document;
mod error;
mod response;
mod revision;
mod user;
mod view;

pub use bulk::{BulkRequest, BulkResult};
pub use change::{Change, ChangeDecoder, ChangeRev, FeedRecord};
pub use database::DatabaseMeta;
pub use document::{DesignDocument, Document, ViewDefinition};
pub use error::{ProtocolError, ProtocolResult};
pub use response::ErrorResponse;
pub use revision::revision;
pub use user::{user_id, User, USERS_DATABASE, USER_ID_PREFIX};
pub use view::{ViewResults, ViewRow};
