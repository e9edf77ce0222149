//! Test fixtures: a client wired to a fresh [`MemoryCouch`].
//!
//! ```rust,ignore
//! use couchwire_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn stores_documents() {
//!     let couch = TestCouch::new();
//!     let db = couch.create_database("playground").await;
//!     db.put("a", &serde_json::json!({"n": 1})).await.unwrap();
//! }
//! ```

use crate::server::MemoryCouch;
use couchwire_client::{Client, ClientConfig, Database, RequestObserver};
use std::sync::Arc;

/// Host the fixture client is configured with. Nothing listens there.
pub const TEST_HOST: &str = "http://couch.test:5984";

/// An in-memory server plus a client talking to it.
pub struct TestCouch {
    /// The server.
    pub server: MemoryCouch,
    /// A client whose executor is `server`.
    pub client: Client,
}

impl TestCouch {
    /// Creates a fresh server and a client with default configuration.
    pub fn new() -> Self {
        Self::with_config(ClientConfig::new(TEST_HOST))
    }

    /// Creates a fresh server and a client built from `config`.
    pub fn with_config(config: ClientConfig) -> Self {
        let server = MemoryCouch::new();
        let client = Client::builder(config)
            .executor(server.executor())
            .build()
            .expect("Failed to build test client");
        Self { server, client }
    }

    /// Creates a fresh server and a client reporting to `observer`.
    pub fn with_observer(observer: Arc<dyn RequestObserver>) -> Self {
        let server = MemoryCouch::new();
        let client = Client::builder(ClientConfig::new(TEST_HOST))
            .executor(server.executor())
            .observer(observer)
            .build()
            .expect("Failed to build test client");
        Self { server, client }
    }

    /// Creates database `name` on the server and returns a handle to it.
    pub async fn create_database(&self, name: &str) -> Database {
        self.client
            .databases()
            .create(name)
            .await
            .expect("Failed to create test database");
        self.client.database(name)
    }
}

impl Default for TestCouch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestCouch {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

/// Common data sets.
pub mod scenarios {
    use couchwire_client::Database;
    use serde_json::json;

    /// Writes `n` documents `doc-000`, `doc-001`, ... with fields `n` and
    /// `even`. Returns their IDs and revisions in write order.
    pub async fn populated(db: &Database, n: usize) -> Vec<(String, String)> {
        let mut written = Vec::with_capacity(n);
        for i in 0..n {
            let id = format!("doc-{:03}", i);
            let rev = db
                .put(&id, &json!({"n": i, "even": i % 2 == 0}))
                .await
                .expect("Failed to write scenario document");
            written.push((id, rev));
        }
        written
    }
}
