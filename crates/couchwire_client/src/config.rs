//! Configuration for the client.

use std::fmt;
use std::time::Duration;

/// Host used when none is configured.
pub const DEFAULT_HOST: &str = "http://127.0.0.1:5984";

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the server, e.g. `http://127.0.0.1:5984`.
    pub host: String,
    /// Timeout for a whole call. Change feeds are exempt.
    pub timeout: Duration,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Basic authentication credentials.
    pub credentials: Option<Credentials>,
}

impl ClientConfig {
    /// Creates a configuration for `host`.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("couchwire/{}", env!("CARGO_PKG_VERSION")),
            credentials: None,
        }
    }

    /// Sets the call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the `User-Agent` header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Authenticates every request with HTTP basic authentication.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

/// Username and password for basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.credentials.is_none());
    }

    #[test]
    fn config_builder() {
        let config = ClientConfig::new("https://couch.example.com/")
            .with_timeout(Duration::from_secs(5))
            .with_connect_timeout(Duration::from_secs(1))
            .with_basic_auth("admin", "hunter2");

        assert_eq!(config.host, "https://couch.example.com");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(
            config.credentials,
            Some(Credentials::new("admin", "hunter2"))
        );
    }

    #[test]
    fn credentials_debug_hides_password() {
        let debug = format!("{:?}", Credentials::new("admin", "hunter2"));
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }
}
