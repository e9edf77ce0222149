//! Database handle.
//!
//! Document, view, bulk and change-feed operations are implemented on
//! [`Database`] in their own modules.

use crate::client::Client;
use crate::error::Result;
use crate::http::{HttpResponse, Request};
use reqwest::Method;

/// A handle to one database.
///
/// Creating a handle makes no request; the database may not exist yet.
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    name: String,
}

impl Database {
    pub(crate) fn new(client: Client, name: String) -> Self {
        Self { client, name }
    }

    /// Returns the database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the client the handle was created from.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Starts a request below `/{db}`.
    pub(crate) fn request(&self, method: Method) -> Request {
        Request::new(method).segment(self.name.clone())
    }

    /// Sends a request and checks the status.
    pub(crate) async fn send(&self, request: Request, accepted: &[u16]) -> Result<HttpResponse> {
        self.client.send(request, accepted).await
    }
}
