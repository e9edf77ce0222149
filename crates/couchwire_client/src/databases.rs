//! Database lifecycle.

use crate::client::Client;
use crate::error::Result;
use crate::http::{HttpResponse, Request};
use couchwire_protocol::DatabaseMeta;
use reqwest::Method;
use tracing::debug;

/// Creates, deletes and inspects databases.
#[derive(Debug, Clone)]
pub struct DatabaseService {
    client: Client,
}

impl DatabaseService {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a database.
    ///
    /// Fails with a precondition-failed [`Error::Api`] if it already
    /// exists.
    pub async fn create(&self, name: &str) -> Result<()> {
        self.send(Request::new(Method::PUT).segment(name), &[201, 202])
            .await?;
        debug!(db = name, "database created");
        Ok(())
    }

    /// Deletes a database and all its documents.
    pub async fn delete(&self, name: &str) -> Result<()> {
        self.send(Request::new(Method::DELETE).segment(name), &[200, 202])
            .await?;
        debug!(db = name, "database deleted");
        Ok(())
    }

    /// Returns whether a database exists.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        match self
            .send(Request::new(Method::HEAD).segment(name), &[200])
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Returns database metadata.
    pub async fn meta(&self, name: &str) -> Result<DatabaseMeta> {
        let response = self
            .send(Request::new(Method::GET).segment(name), &[200])
            .await?;
        response.body.json().await
    }

    async fn send(&self, request: Request, accepted: &[u16]) -> Result<HttpResponse> {
        self.client.send(request, accepted).await
    }
}
