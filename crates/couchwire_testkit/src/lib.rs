//! # couchwire Testkit
//!
//! Test utilities for couchwire.
//!
//! This crate provides:
//! - [`MemoryCouch`], an in-memory CouchDB that plugs into the client's
//!   [`HttpExecutor`](couchwire_client::HttpExecutor) seam
//! - Fault injection: transport failures and canned, possibly broken,
//!   responses
//! - Fixtures and data scenarios
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use couchwire_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn reads_back_documents() {
//!     let couch = TestCouch::new();
//!     let db = couch.create_database("playground").await;
//!     let rev = db.put("a", &serde_json::json!({"n": 1})).await.unwrap();
//!     assert_eq!(db.rev("a").await.unwrap(), rev);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod changes;
pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod server;
pub mod store;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::server::*;
}

pub use faults::{BodyEnd, CannedResponse, Fault};
pub use fixtures::{scenarios, TestCouch, TEST_HOST};
pub use generators::*;
pub use server::{LoggedRequest, MemoryCouch};
pub use store::{collate, MapFn, Reply, SYSTEM_DATABASES};
