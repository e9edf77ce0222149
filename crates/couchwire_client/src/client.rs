//! The client handle.

use crate::auth::{Authenticator, BasicAuthenticator};
use crate::config::ClientConfig;
use crate::database::Database;
use crate::databases::DatabaseService;
use crate::error::{Error, Result};
use crate::http::{HttpExecutor, HttpResponse, Request, ReqwestExecutor};
use crate::trace::RequestObserver;
use crate::transport::{ensure_status, Transport};
use crate::users::{AdminService, UserService};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// A CouchDB client.
///
/// Cheap to clone; clones share the executor and configuration. The client
/// holds no mutable state, so it can be used from any number of tasks.
#[derive(Clone)]
pub struct Client {
    transport: Arc<Transport>,
}

impl Client {
    /// Creates a client with the default `reqwest` executor.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Starts building a client with custom collaborators.
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            executor: None,
            authenticator: None,
            observer: None,
        }
    }

    /// Returns the host URL.
    pub fn host(&self) -> &Url {
        &self.transport.host
    }

    /// Returns a handle to a database. No request is made.
    pub fn database(&self, name: impl Into<String>) -> Database {
        Database::new(self.clone(), name.into())
    }

    /// Returns the database lifecycle service.
    pub fn databases(&self) -> DatabaseService {
        DatabaseService::new(self.clone())
    }

    /// Returns the `_users` service.
    pub fn users(&self) -> UserService {
        UserService::new(self.clone())
    }

    /// Returns the server admin service.
    pub fn admins(&self) -> AdminService {
        AdminService::new(self.clone())
    }

    /// Sends a raw request.
    ///
    /// Error-shaped responses (400 and above with an `{error, reason}`
    /// body) are returned as [`Error::Api`]; every other response is
    /// returned for the caller to inspect.
    pub async fn execute(&self, request: Request) -> Result<HttpResponse> {
        self.transport.execute(request).await
    }

    /// Sends a request and fails unless the status is one of `accepted`.
    pub(crate) async fn send(&self, request: Request, accepted: &[u16]) -> Result<HttpResponse> {
        let method = request.method().clone();
        let path = request.path();
        let response = self.transport.execute(request).await?;
        ensure_status(&method, &path, response, accepted).await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.transport.host.as_str())
            .field("timeout", &self.transport.timeout)
            .field("authenticated", &self.transport.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    executor: Option<Arc<dyn HttpExecutor>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    observer: Option<Arc<dyn RequestObserver>>,
}

impl ClientBuilder {
    /// Uses a custom HTTP executor instead of `reqwest`.
    pub fn executor(mut self, executor: Arc<dyn HttpExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Uses a custom authenticator. Overrides configured credentials.
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Observes every call.
    pub fn observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<Client> {
        let host = Url::parse(&self.config.host)
            .map_err(|e| Error::request(format!("invalid host {}: {}", self.config.host, e)))?;
        if host.cannot_be_a_base() {
            return Err(Error::request(format!(
                "invalid host {}: not a base URL",
                self.config.host
            )));
        }

        let executor = match self.executor {
            Some(executor) => executor,
            None => Arc::new(ReqwestExecutor::new(&self.config)?),
        };

        let authenticator = match (self.authenticator, &self.config.credentials) {
            (Some(authenticator), _) => Some(authenticator),
            (None, Some(credentials)) => Some(
                Arc::new(BasicAuthenticator::from_credentials(credentials)?) as Arc<dyn Authenticator>,
            ),
            (None, None) => None,
        };

        Ok(Client {
            transport: Arc::new(Transport {
                host,
                executor,
                authenticator,
                observer: self.observer,
                timeout: self.config.timeout,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_hosts() {
        assert!(matches!(
            Client::new(ClientConfig::new("not a url")),
            Err(Error::Request(_))
        ));
        assert!(matches!(
            Client::new(ClientConfig::new("mailto:admin@example.com")),
            Err(Error::Request(_))
        ));
    }

    #[test]
    fn rejects_invalid_credentials() {
        let config = ClientConfig::default().with_basic_auth("ad:min", "password");
        assert!(matches!(Client::new(config), Err(Error::Request(_))));
    }

    #[test]
    fn clones_share_state() {
        let client = Client::new(ClientConfig::default()).unwrap();
        let clone = client.clone();
        assert!(Arc::ptr_eq(&client.transport, &clone.transport));
        assert_eq!(client.host().as_str(), "http://127.0.0.1:5984/");
    }

    #[test]
    fn debug_hides_credentials() {
        let client =
            Client::new(ClientConfig::default().with_basic_auth("admin", "hunter2")).unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("authenticated: true"));
        assert!(!debug.contains("hunter2"));
    }
}
