//! Bulk writes.

use crate::database::Database;
use crate::error::Result;
use couchwire_protocol::{BulkRequest, BulkResult};
use reqwest::Method;
use serde::Serialize;
use tracing::debug;

impl Database {
    /// Writes several documents in one request.
    ///
    /// The call succeeds even when individual documents are rejected;
    /// check each [`BulkResult`]. Results are in request order.
    pub async fn bulk_put<T: Serialize>(&self, request: &BulkRequest<T>) -> Result<Vec<BulkResult>> {
        let http = self
            .request(Method::POST)
            .segment("_bulk_docs")
            .json(request)?;
        let response = self.send(http, &[200, 201]).await?;
        let results: Vec<BulkResult> = response.body.json().await?;
        debug!(
            db = %self.name(),
            docs = results.len(),
            rejected = results.iter().filter(|r| !r.is_ok()).count(),
            "bulk write finished"
        );
        Ok(results)
    }
}
