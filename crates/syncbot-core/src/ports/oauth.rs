//! OAuth ports (driven/secondary ports)
//!
//! The authorization flow is split into URL construction, browser launch,
//! redirect capture and code exchange so that the automatic listener path
//! and the manual paste path converge on one exchange step.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AuthorizationCode, Credentials, Token};

/// OAuth2 authorization-code provider
#[async_trait]
pub trait IOAuthProvider: Send + Sync {
    /// Builds the consent URL for the given client. No network access.
    fn authorization_url(&self, credentials: &Credentials) -> anyhow::Result<String>;

    /// Exchanges a redirect code for a token
    async fn exchange_code(
        &self,
        credentials: &Credentials,
        code: &AuthorizationCode,
    ) -> anyhow::Result<Token>;

    /// Obtains a fresh access token from a refresh token
    async fn refresh(&self, credentials: &Credentials, refresh_token: &str)
        -> anyhow::Result<Token>;
}

/// Opens URLs in the user's default browser
pub trait IBrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> anyhow::Result<()>;
}

/// Failure modes of the redirect listener
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListenError {
    /// The listener could not start (e.g. port already in use); the manual
    /// entry path applies
    #[error("Redirect listener unavailable: {0}")]
    Unavailable(String),

    /// The listener started but the redirect carried no usable code
    #[error("Redirect listener failed: {0}")]
    Failed(String),
}

/// Captures the authorization code from the provider redirect
///
/// Dropping the returned future stops listening and releases the port.
#[async_trait]
pub trait IRedirectListener: Send + Sync {
    async fn listen(&self) -> Result<AuthorizationCode, ListenError>;
}
