//! Regular and administrative user management.

use crate::client::Client;
use crate::database::Database;
use crate::error::Result;
use crate::http::Request;
use couchwire_protocol::{Document, User, USERS_DATABASE};
use reqwest::Method;
use std::collections::BTreeMap;
use tracing::debug;

/// Parameters for creating a regular user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateUser {
    /// Login name.
    pub name: String,
    /// Clear-text password.
    pub password: String,
    /// Roles to grant.
    pub roles: Vec<String>,
}

/// Parameters for replacing an existing regular user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateUser {
    /// Document ID, `org.couchdb.user:{name}`.
    pub id: String,
    /// Login name.
    pub name: String,
    /// New clear-text password.
    pub password: String,
    /// Roles to grant.
    pub roles: Vec<String>,
}

/// Manages regular users in the `_users` database.
#[derive(Debug, Clone)]
pub struct UserService {
    db: Database,
}

impl UserService {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            db: client.database(USERS_DATABASE),
        }
    }

    /// Creates a user and returns the stored document.
    pub async fn create(&self, user: CreateUser) -> Result<User> {
        let mut doc = User::new(user.name, user.password, user.roles);
        doc.document.rev = self.db.put(&doc.document.id, &doc).await?;
        debug!(user = %doc.name, "user created");
        Ok(doc)
    }

    /// Replaces a user.
    ///
    /// The current revision is fetched first, so this overwrites whatever
    /// is stored.
    pub async fn update(&self, user: UpdateUser) -> Result<User> {
        let rev = self.db.rev(&user.id).await?;
        let mut doc = User {
            document: Document::with_rev(user.id, rev),
            name: user.name,
            password: user.password,
            roles: user.roles,
            kind: "user".into(),
        };
        doc.document.rev = self.db.put(&doc.document.id, &doc).await?;
        Ok(doc)
    }

    /// Deletes a user at its current revision.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let rev = self.db.rev(id).await?;
        self.db.delete(id, &rev).await?;
        debug!(id, "user deleted");
        Ok(())
    }

    /// Fetches a user.
    pub async fn get(&self, id: &str) -> Result<User> {
        self.db.get(id).await
    }
}

/// Manages server administrators under `/_config/admins`.
#[derive(Debug, Clone)]
pub struct AdminService {
    client: Client,
}

impl AdminService {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    fn request(method: Method) -> Request {
        Request::new(method).segment("_config").segment("admins")
    }

    /// Creates an administrator.
    pub async fn create(&self, name: &str, password: &str) -> Result<()> {
        let request = Self::request(Method::PUT).segment(name).json(password)?;
        self.client.send(request, &[200]).await?;
        debug!(admin = name, "admin saved");
        Ok(())
    }

    /// Changes an administrator's password.
    pub async fn update(&self, name: &str, password: &str) -> Result<()> {
        self.create(name, password).await
    }

    /// Lists administrator names in sorted order.
    pub async fn list(&self) -> Result<Vec<String>> {
        let response = self.client.send(Self::request(Method::GET), &[200]).await?;
        let admins: BTreeMap<String, String> = response.body.json().await?;
        Ok(admins.into_keys().collect())
    }

    /// Deletes an administrator.
    pub async fn delete(&self, name: &str) -> Result<()> {
        self.client
            .send(Self::request(Method::DELETE).segment(name), &[200])
            .await?;
        debug!(admin = name, "admin deleted");
        Ok(())
    }
}
