//! The `{error, reason}` body CouchDB returns for failed requests.

use serde::{Deserialize, Serialize};

/// Structured error body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short error code, e.g. `conflict` or `not_found`.
    pub error: String,
    /// Human readable reason.
    #[serde(default)]
    pub reason: String,
}

impl ErrorResponse {
    /// Creates an error body.
    pub fn new(error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            reason: reason.into(),
        }
    }

    /// Parses an error body. Returns `None` unless the bytes are a JSON
    /// object with a string `error` field.
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conflict_body() {
        let parsed =
            ErrorResponse::parse(br#"{"error":"conflict","reason":"Document update conflict."}"#)
                .unwrap();
        assert_eq!(parsed.error, "conflict");
        assert_eq!(parsed.reason, "Document update conflict.");
    }

    #[test]
    fn reason_is_optional() {
        let parsed = ErrorResponse::parse(br#"{"error":"not_found"}"#).unwrap();
        assert_eq!(parsed.reason, "");
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(ErrorResponse::parse(b"").is_none());
        assert!(ErrorResponse::parse(b"<html>bad gateway</html>").is_none());
        assert!(ErrorResponse::parse(br#"{"ok":true}"#).is_none());
    }
}
