//! View queries and design documents.

use crate::database::Database;
use crate::error::{Error, Result};
use crate::http::Request;
use couchwire_protocol::{DesignDocument, ViewResults};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Options shared by view and `_all_docs` queries.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    /// Maximum number of rows. Defaults to 100.
    pub limit: u64,
    /// Include the full documents in the rows.
    pub include_docs: bool,
    /// First key to return.
    pub start_key: Option<Value>,
    /// Last key to return.
    pub end_key: Option<Value>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            include_docs: false,
            start_key: None,
            end_key: None,
        }
    }
}

impl QueryOptions {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the row limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Includes the documents in the rows.
    pub fn include_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = include_docs;
        self
    }

    /// Sets the first key.
    pub fn start_key(mut self, key: impl Into<Value>) -> Self {
        self.start_key = Some(key.into());
        self
    }

    /// Sets the last key.
    pub fn end_key(mut self, key: impl Into<Value>) -> Self {
        self.end_key = Some(key.into());
        self
    }

    /// Adds the options to a request. Keys are sent JSON-encoded.
    pub(crate) fn apply(&self, mut request: Request) -> Result<Request> {
        request = request.query("limit", self.limit);
        if self.include_docs {
            request = request.query("include_docs", "true");
        }
        if let Some(key) = &self.start_key {
            request = request.query("startkey", encode_key(key)?);
        }
        if let Some(key) = &self.end_key {
            request = request.query("endkey", encode_key(key)?);
        }
        Ok(request)
    }
}

fn encode_key(key: &Value) -> Result<String> {
    serde_json::to_string(key).map_err(|e| Error::request(format!("failed to encode key: {}", e)))
}

impl Database {
    /// Queries a view of a design document.
    ///
    /// `design` is the design document name without the `_design/` prefix.
    pub async fn view<T: DeserializeOwned>(
        &self,
        design: &str,
        view: &str,
        options: &QueryOptions,
    ) -> Result<ViewResults<T>> {
        let request = self
            .request(Method::GET)
            .segment("_design")
            .segment(design)
            .segment("_view")
            .segment(view);
        let response = self.send(options.apply(request)?, &[200]).await?;
        response.body.json().await
    }

    /// Stores a design document and returns its new revision.
    pub async fn put_design(&self, design: &DesignDocument) -> Result<String> {
        self.put(&design.document.id, design).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_options() {
        let request = QueryOptions::default()
            .apply(Request::new(Method::GET))
            .unwrap();
        assert_eq!(request.query_value("limit"), Some("100"));
        assert_eq!(request.query_value("include_docs"), None);
        assert_eq!(request.query_value("startkey"), None);
    }

    #[test]
    fn keys_are_json_encoded() {
        let request = QueryOptions::new()
            .limit(10)
            .include_docs(true)
            .start_key("employee:")
            .end_key(json!(["employee:", {}]))
            .apply(Request::new(Method::GET))
            .unwrap();
        assert_eq!(request.query_value("limit"), Some("10"));
        assert_eq!(request.query_value("include_docs"), Some("true"));
        assert_eq!(request.query_value("startkey"), Some("\"employee:\""));
        assert_eq!(request.query_value("endkey"), Some("[\"employee:\",{}]"));
    }
}
