//! SyncBot Drive - Google adapters
//!
//! Provides:
//! - OAuth2 authorization-code flow against Google identity
//! - A loopback listener that captures the redirect code
//! - A Google Drive v3 client for folder lookup and content upload
//!
//! ## Modules
//!
//! - [`auth`] - OAuth2 provider, loopback callback server, browser launcher
//! - [`client`] - Drive v3 HTTP client with retry
//! - [`provider`] - [`IRemoteDrive`](syncbot_core::ports::IRemoteDrive) adapter

pub mod auth;
pub mod client;
pub mod provider;

use std::time::Duration;

use thiserror::Error;

pub use auth::{GoogleOAuthConfig, GoogleOAuthProvider, LocalCallbackServer, SystemBrowser};
pub use client::{DriveClient, RetryPolicy};
pub use provider::GoogleDriveProvider;

/// Errors returned by the Google Drive API
#[derive(Debug, Error)]
pub enum DriveError {
    /// The access token was rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests { retry_after: Duration },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// Any other non-success status
    #[error("Request failed with HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The response could not be parsed or was missing fields
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl DriveError {
    /// Whether repeating the request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TooManyRequests { .. } | Self::ServerError(_) | Self::NetworkError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DriveError::ServerError("503".into()).is_transient());
        assert!(DriveError::TooManyRequests {
            retry_after: Duration::from_secs(1)
        }
        .is_transient());
        assert!(!DriveError::Unauthorized("expired".into()).is_transient());
        assert!(!DriveError::Api {
            status: 400,
            message: "bad".into()
        }
        .is_transient());
    }

    #[test]
    fn test_unauthorized_display() {
        let err = DriveError::Unauthorized("Invalid Credentials".into());
        assert_eq!(err.to_string(), "Unauthorized: Invalid Credentials");
    }
}
