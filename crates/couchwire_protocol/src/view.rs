//! View and `_all_docs` results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of a view result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow<T> {
    /// ID of the document that emitted the row.
    #[serde(default)]
    pub id: String,
    /// Emitted key.
    #[serde(default)]
    pub key: Value,
    /// Emitted value.
    pub value: T,
    /// The full document, when `include_docs` was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
}

/// Result envelope of a view or `_all_docs` query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewResults<T> {
    /// Offset of the first returned row.
    #[serde(default)]
    pub offset: u64,
    /// Total rows in the view.
    #[serde(default)]
    pub total_rows: u64,
    /// Returned rows.
    pub rows: Vec<ViewRow<T>>,
}

impl<T> ViewResults<T> {
    /// Iterates over the row values.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.iter().map(|row| &row.value)
    }
}
