//! Authentication domain types
//!
//! [`AuthState`] is the state machine surfaced to callers. [`Credentials`],
//! [`Token`] and [`AuthorizationCode`] carry secrets, so their `Debug`
//! output is redacted.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// AuthState
// ============================================================================

/// Authentication state of the agent
///
/// ```text
/// Unauthenticated --begin--> AuthorizationPending --exchange ok--> Authenticated
///        ^                          |                                   |
///        +--- exchange failed, -----+                                   |
///             timeout, cancelled          (re-auth) <----begin----------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// No usable token is stored
    Unauthenticated,
    /// The user is completing consent in the browser
    AuthorizationPending,
    /// A token is stored and usable
    Authenticated,
}

impl AuthState {
    /// Returns true only for [`AuthState::Authenticated`]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::AuthorizationPending => "authorization_pending",
            AuthState::Authenticated => "authenticated",
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// OAuth client credentials supplied by the user
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Token
// ============================================================================

/// OAuth token bundle returned by the code exchange
///
/// Contains the access token for API requests, an optional refresh token
/// for obtaining new access tokens, and the expiration time.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Bearer token for authenticating API requests
    pub access_token: String,
    /// Token for refreshing the access token without user interaction
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// Returns true if the access token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the access token will expire within the given duration
    pub fn expires_within(&self, duration: Duration) -> bool {
        Utc::now() + duration >= self.expires_at
    }

    /// Returns true if the token can be renewed without the browser flow
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// ============================================================================
// AuthorizationCode
// ============================================================================

/// Single-use code returned by the provider's redirect
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationCode(String);

impl AuthorizationCode {
    /// Wraps a code, trimming surrounding whitespace left over from copy/paste
    pub fn new(code: impl Into<String>) -> Result<Self, DomainError> {
        let code = code.into();
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidCode("code is empty".to_string()));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidCode(
                "code must not contain whitespace".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthorizationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorizationCode([REDACTED])")
    }
}

// ============================================================================
// Interactive auth results
// ============================================================================

/// Result of waiting for the provider redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractiveAuth {
    /// The loopback listener captured the code
    CapturedAutomatically(AuthorizationCode),
    /// The listener could not be started; the user must paste the code
    RequiresManualEntry {
        /// Why the automatic path is unavailable
        reason: String,
    },
}

/// Result of a complete interactive login attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoginOutcome {
    /// The code was captured and exchanged; the token is persisted
    Authenticated,
    /// The user must paste the code from the browser
    RequiresManualEntry { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_state_display() {
        assert_eq!(AuthState::Unauthenticated.to_string(), "unauthenticated");
        assert_eq!(
            AuthState::AuthorizationPending.to_string(),
            "authorization_pending"
        );
        assert_eq!(AuthState::Authenticated.to_string(), "authenticated");
        assert!(AuthState::Authenticated.is_authenticated());
        assert!(!AuthState::AuthorizationPending.is_authenticated());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::new("client", "top-secret");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("client"));
        assert!(!rendered.contains("top-secret"));
    }

    #[test]
    fn test_token_expiry() {
        let token = Token {
            access_token: "a".into(),
            refresh_token: Some("r".into()),
            expires_at: Utc::now() + Duration::minutes(3),
        };
        assert!(!token.is_expired());
        assert!(token.expires_within(Duration::minutes(5)));
        assert!(!token.expires_within(Duration::minutes(1)));
        assert!(token.can_refresh());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = Token {
            access_token: "ya29.secret".into(),
            refresh_token: Some("1//refresh".into()),
            expires_at: Utc::now(),
        };
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("ya29.secret"));
        assert!(!rendered.contains("1//refresh"));
    }

    #[test]
    fn test_token_json_roundtrip_keeps_refresh_token() {
        let token = Token {
            access_token: "a".into(),
            refresh_token: None,
            expires_at: Utc::now(),
        };
        let json = serde_json::to_string(&token).unwrap();
        let back: Token = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
        assert!(!back.can_refresh());
    }

    #[test]
    fn test_authorization_code_validation() {
        let code = AuthorizationCode::new("  4/0AbCd  \n").unwrap();
        assert_eq!(code.as_str(), "4/0AbCd");
        assert!(AuthorizationCode::new("   ").is_err());
        assert!(AuthorizationCode::new("abc def").is_err());
        assert_eq!(format!("{code:?}"), "AuthorizationCode([REDACTED])");
    }

    #[test]
    fn test_login_outcome_serializes_tagged() {
        let json = serde_json::to_value(LoginOutcome::RequiresManualEntry {
            reason: "port busy".into(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "requires_manual_entry");
        assert_eq!(json["reason"], "port busy");
    }
}
