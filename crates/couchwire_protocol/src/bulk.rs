//! Payloads of `POST /{db}/_bulk_docs`.

use serde::{Deserialize, Serialize};

/// Request body for a bulk write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkRequest<T> {
    /// When false, the server stores the supplied revisions as-is
    /// (replication mode) instead of assigning new ones.
    #[serde(default = "default_new_edits")]
    pub new_edits: bool,
    /// Documents to write.
    pub docs: Vec<T>,
}

fn default_new_edits() -> bool {
    true
}

impl<T> BulkRequest<T> {
    /// Creates a bulk request that lets the server assign revisions.
    pub fn new(docs: Vec<T>) -> Self {
        Self {
            new_edits: true,
            docs,
        }
    }

    /// Sets the `new_edits` flag.
    pub fn with_new_edits(mut self, new_edits: bool) -> Self {
        self.new_edits = new_edits;
        self
    }
}

/// Per-document outcome of a bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
    /// Document ID.
    #[serde(default)]
    pub id: String,
    /// New revision on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Set on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// Error code on failure, e.g. `conflict`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BulkResult {
    /// Returns true if the document was written.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Returns true if the document was rejected as a conflict.
    pub fn is_conflict(&self) -> bool {
        self.error.as_deref() == Some("conflict")
    }
}
