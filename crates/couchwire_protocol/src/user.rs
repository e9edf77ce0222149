//! User documents stored in the authentication database.

use crate::document::Document;
use serde::{Deserialize, Serialize};

/// Name of the authentication database.
pub const USERS_DATABASE: &str = "_users";

/// ID prefix of user documents.
pub const USER_ID_PREFIX: &str = "org.couchdb.user:";

/// Returns the document ID of the user called `name`.
pub fn user_id(name: &str) -> String {
    format!("{}{}", USER_ID_PREFIX, name)
}

/// A regular (non-admin) user document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identification fields.
    #[serde(flatten)]
    pub document: Document,
    /// Login name.
    pub name: String,
    /// Clear-text password. The server hashes it on write and never
    /// returns it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    /// Roles granted to the user.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Always `user`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl User {
    /// Creates a user document for `name`.
    pub fn new(name: impl Into<String>, password: impl Into<String>, roles: Vec<String>) -> Self {
        let name = name.into();
        Self {
            document: Document::new(user_id(&name)),
            name,
            password: password.into(),
            roles,
            kind: "user".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_document_shape() {
        let user = User::new("martin", "secret", vec!["staff".into()]);
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(
            value,
            json!({
                "_id": "org.couchdb.user:martin",
                "name": "martin",
                "password": "secret",
                "roles": ["staff"],
                "type": "user"
            })
        );
    }

    #[test]
    fn stored_user_has_no_password() {
        let user: User = serde_json::from_value(json!({
            "_id": "org.couchdb.user:martin",
            "_rev": "1-x",
            "name": "martin",
            "roles": [],
            "type": "user",
            "password_scheme": "pbkdf2"
        }))
        .unwrap();
        assert_eq!(user.document.rev, "1-x");
        assert!(user.password.is_empty());
    }
}
