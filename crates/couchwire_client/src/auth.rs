//! Authentication support for outgoing requests.
//!
//! An [`Authenticator`] decorates every request right before it is sent.
//! A failure aborts the call before any I/O happens.

use crate::config::Credentials;
use crate::error::Error;
use crate::http::HttpRequest;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use std::fmt;
use thiserror::Error;

/// Errors raised while decorating a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The credentials cannot be expressed in the scheme.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The credential source is unavailable (expired session, missing
    /// token).
    #[error("credentials unavailable: {0}")]
    Unavailable(String),
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        Error::Request(format!("authentication failed: {}", err))
    }
}

/// Decorates requests with credentials.
pub trait Authenticator: Send + Sync {
    /// Adds credentials to the request.
    fn decorate(&self, request: &mut HttpRequest) -> Result<(), AuthError>;
}

/// HTTP basic authentication.
#[derive(Clone)]
pub struct BasicAuthenticator {
    username: String,
    header: HeaderValue,
}

impl BasicAuthenticator {
    /// Creates an authenticator from a username and password.
    ///
    /// Fails if the username contains `:`, which the scheme cannot carry.
    pub fn new(username: &str, password: &str) -> Result<Self, AuthError> {
        if username.contains(':') {
            return Err(AuthError::InvalidCredentials(
                "username must not contain ':'".into(),
            ));
        }
        let token = STANDARD.encode(format!("{}:{}", username, password));
        let mut header = HeaderValue::from_str(&format!("Basic {}", token))
            .map_err(|e| AuthError::InvalidCredentials(e.to_string()))?;
        header.set_sensitive(true);
        Ok(Self {
            username: username.to_string(),
            header,
        })
    }

    /// Creates an authenticator from configured credentials.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, AuthError> {
        Self::new(&credentials.username, &credentials.password)
    }

    /// Returns the username.
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl Authenticator for BasicAuthenticator {
    fn decorate(&self, request: &mut HttpRequest) -> Result<(), AuthError> {
        request.headers.insert(AUTHORIZATION, self.header.clone());
        Ok(())
    }
}

impl fmt::Debug for BasicAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthenticator")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
