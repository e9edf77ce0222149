//! Document operations.

use crate::database::Database;
use crate::error::Result;
use crate::view::QueryOptions;
use couchwire_protocol::ViewResults;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

impl Database {
    /// Fetches a document.
    ///
    /// Fails with a not-found [`Error::Api`](crate::Error::Api) if the
    /// document does not exist or was deleted, and with
    /// [`Error::Decode`](crate::Error::Decode) if the body does not match
    /// `T`.
    pub async fn get<T: DeserializeOwned>(&self, id: &str) -> Result<T> {
        let response = self
            .send(self.request(Method::GET).document(id), &[200])
            .await?;
        response.body.json().await
    }

    /// Creates or updates a document and returns its new revision.
    ///
    /// Updating requires the current revision in the document's `_rev`
    /// field; a stale or missing revision fails with a conflict.
    pub async fn put<T: Serialize + ?Sized>(&self, id: &str, doc: &T) -> Result<String> {
        let request = self.request(Method::PUT).document(id).json(doc)?;
        let response = self.send(request, &[200, 201, 202]).await?;
        let rev = response.revision();
        debug!(db = %self.name(), id, rev = %rev, "document written");
        Ok(rev)
    }

    /// Deletes a document at `rev` and returns the revision of the
    /// tombstone.
    pub async fn delete(&self, id: &str, rev: &str) -> Result<String> {
        let request = self.request(Method::DELETE).document(id).query("rev", rev);
        let response = self.send(request, &[200, 202]).await?;
        let rev = response.revision();
        debug!(db = %self.name(), id, rev = %rev, "document deleted");
        Ok(rev)
    }

    /// Returns the current revision of a document without fetching its
    /// body.
    pub async fn rev(&self, id: &str) -> Result<String> {
        let response = self
            .send(self.request(Method::HEAD).document(id), &[200])
            .await?;
        Ok(response.revision())
    }

    /// Lists documents by ID.
    ///
    /// Row values are `{"rev": ...}` objects; set
    /// [`QueryOptions::include_docs`] to get the documents in
    /// [`ViewRow::doc`](couchwire_protocol::ViewRow::doc).
    pub async fn all_docs<T: DeserializeOwned>(
        &self,
        options: &QueryOptions,
    ) -> Result<ViewResults<T>> {
        let request = options.apply(self.request(Method::GET).segment("_all_docs"))?;
        let response = self.send(request, &[200]).await?;
        response.body.json().await
    }
}
