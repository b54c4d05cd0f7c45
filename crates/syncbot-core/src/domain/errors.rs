//! Domain error types
//!
//! This module defines the error taxonomy of the authentication flow and the
//! tracked path set, plus generic validation failures. Every variant is
//! recoverable: the worst outcome of any of them is a rejected operation.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid authorization code
    #[error("Invalid authorization code: {0}")]
    InvalidCode(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors raised by the authentication controller
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing or invalid settings (e.g. incomplete client credentials)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No redirect arrived before the deadline
    #[error("Timed out waiting for the authorization redirect")]
    Timeout,

    /// The caller cancelled the wait for the redirect
    #[error("Authorization was cancelled")]
    Cancelled,

    /// The redirect listener failed after it started (e.g. the provider
    /// redirected with an error instead of a code)
    #[error("Authorization redirect failed: {0}")]
    Callback(String),

    /// The provider rejected the authorization code
    #[error("Authorization code exchange failed: {0}")]
    Exchange(String),

    /// Persisting or loading the token failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// A sync run holds the session; re-authentication must wait
    #[error("A sync is in progress; try again once it finishes")]
    SyncInProgress,

    /// No usable token is available
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Refreshing an expiring access token failed
    #[error("Token refresh failed: {0}")]
    Refresh(String),
}

/// Errors raised by the tracked path set
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathSetError {
    /// The path does not exist or cannot be tracked
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The path is not tracked
    #[error("Path is not tracked: {0}")]
    NotFound(String),

    /// Persisting the set failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<DomainError> for PathSetError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidPath(p) => PathSetError::InvalidPath(p),
            other => PathSetError::InvalidPath(other.to_string()),
        }
    }
}
