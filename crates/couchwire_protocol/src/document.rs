//! Document identification fields and design documents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The identification fields every stored document carries.
///
/// Embed it in your own document types with `#[serde(flatten)]`:
///
/// ```
/// use couchwire_protocol::Document;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Employee {
///     #[serde(flatten)]
///     document: Document,
///     name: String,
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document ID.
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Current revision. Empty until the document has been stored.
    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub rev: String,
    /// Set on deletion tombstones.
    #[serde(rename = "_deleted", default, skip_serializing_if = "is_false")]
    pub deleted: bool,
}

impl Document {
    /// Creates identification fields for a new document.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Creates identification fields for an existing revision.
    pub fn with_rev(id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: rev.into(),
            deleted: false,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Map and reduce functions of a single view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDefinition {
    /// Map function source.
    #[serde(rename = "map", default, skip_serializing_if = "String::is_empty")]
    pub map_fn: String,
    /// Reduce function source.
    #[serde(rename = "reduce", default, skip_serializing_if = "String::is_empty")]
    pub reduce_fn: String,
}

impl ViewDefinition {
    /// Creates a map-only view.
    pub fn map(source: impl Into<String>) -> Self {
        Self {
            map_fn: source.into(),
            reduce_fn: String::new(),
        }
    }
}

/// A design document: a language plus its named views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignDocument {
    /// Identification fields. The ID carries the `_design/` prefix.
    #[serde(flatten)]
    pub document: Document,
    /// Query language of the view functions.
    pub language: String,
    /// Views by name.
    pub views: BTreeMap<String, ViewDefinition>,
}

impl DesignDocument {
    /// Creates an empty javascript design document named `name`.
    pub fn new(name: &str) -> Self {
        Self {
            document: Document::new(format!("_design/{}", name)),
            language: "javascript".into(),
            views: BTreeMap::new(),
        }
    }

    /// Adds a view.
    pub fn with_view(mut self, name: impl Into<String>, view: ViewDefinition) -> Self {
        self.views.insert(name.into(), view);
        self
    }
}
