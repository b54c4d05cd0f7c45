//! Authentication use case
//!
//! Owns the OAuth2 authentication state machine: authorization URL
//! construction, browser launch, redirect capture with manual fallback,
//! code exchange, token persistence and token refresh. Delegates provider
//! I/O to the OAuth ports and persistence to the config store port.
//!
//! The automatic (loopback listener) and manual (pasted code) paths both end
//! in [`AuthController::exchange_code`], so they share one failure policy and
//! produce identical persisted state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tokio::sync::{watch, Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    domain::{
        AuthError, AuthState, AuthorizationCode, Credentials, InteractiveAuth, LoginOutcome, Token,
    },
    ports::{IBrowserLauncher, IConfigStore, IOAuthProvider, IRedirectListener, ListenError},
};

/// Access tokens expiring within this margin are refreshed before a sync
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Exclusive use of the current token for the duration of a sync run
///
/// While an `ActiveSession` is alive, code exchange waits and new
/// interactive logins are rejected with [`AuthError::SyncInProgress`].
pub struct ActiveSession {
    token: Token,
    _guard: OwnedMutexGuard<()>,
}

impl ActiveSession {
    pub fn token(&self) -> &Token {
        &self.token
    }
}

impl std::fmt::Debug for ActiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSession")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Authentication controller
///
/// State is published through a `watch` channel, so [`AuthController::status`]
/// never blocks and observers can [`subscribe`](AuthController::subscribe)
/// instead of polling.
pub struct AuthController {
    store: Arc<dyn IConfigStore>,
    provider: Arc<dyn IOAuthProvider>,
    browser: Arc<dyn IBrowserLauncher>,
    listener: Arc<dyn IRedirectListener>,
    state: watch::Sender<AuthState>,
    token: RwLock<Option<Token>>,
    session: Arc<Mutex<()>>,
}

impl AuthController {
    /// Creates a controller in the `Unauthenticated` state
    ///
    /// Call [`AuthController::restore`] to pick up a previously stored token.
    pub fn new(
        store: Arc<dyn IConfigStore>,
        provider: Arc<dyn IOAuthProvider>,
        browser: Arc<dyn IBrowserLauncher>,
        listener: Arc<dyn IRedirectListener>,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::Unauthenticated);
        Self {
            store,
            provider,
            browser,
            listener,
            state,
            token: RwLock::new(None),
            session: Arc::new(Mutex::new(())),
        }
    }

    /// Loads the persisted token, becoming `Authenticated` if one exists
    pub async fn restore(&self) -> Result<AuthState, AuthError> {
        let stored = self
            .store
            .load_token()
            .await
            .map_err(|e| AuthError::Storage(format!("{e:#}")))?;

        let state = if stored.is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };
        *self.token.write().await = stored;
        self.state.send_replace(state);
        debug!(%state, "Restored authentication state");
        Ok(state)
    }

    /// Current state; never blocks
    pub fn status(&self) -> AuthState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Builds the consent URL from the stored client credentials
    ///
    /// # Errors
    ///
    /// [`AuthError::Config`] if the client ID or secret is missing.
    pub async fn authorization_url(&self) -> Result<String, AuthError> {
        let credentials = self.credentials().await?;
        self.provider
            .authorization_url(&credentials)
            .map_err(|e| AuthError::Config(format!("{e:#}")))
    }

    /// Opens the consent page and moves to `AuthorizationPending`
    ///
    /// Calling again while pending re-opens the browser and leaves any
    /// active redirect listener alone. Returns the URL so callers can show
    /// it when the browser cannot be launched.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Config`] if credentials are incomplete
    /// - [`AuthError::SyncInProgress`] while a sync run holds the session
    pub async fn begin_interactive_auth(&self) -> Result<String, AuthError> {
        let url = self.authorization_url().await?;

        {
            let _idle = self
                .session
                .try_lock()
                .map_err(|_| AuthError::SyncInProgress)?;
            let previous = self.state.send_replace(AuthState::AuthorizationPending);
            info!(from = %previous, "Authorization pending");
        }

        if let Err(e) = self.browser.open(&url) {
            warn!(error = %e, "Could not open the browser; the URL must be opened manually");
        }
        Ok(url)
    }

    /// Waits for the loopback listener to capture the redirect code
    ///
    /// Suspends only the calling task. Returns
    /// [`InteractiveAuth::RequiresManualEntry`] when the listener cannot be
    /// started, leaving the state `AuthorizationPending` so the pasted code
    /// can be exchanged.
    ///
    /// # Errors
    ///
    /// [`AuthError::Timeout`], [`AuthError::Cancelled`] or
    /// [`AuthError::Callback`]; each one abandons the pending attempt.
    pub async fn await_redirect_code(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<InteractiveAuth, AuthError> {
        debug!(timeout_secs = timeout.as_secs(), "Waiting for authorization redirect");

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
            listened = tokio::time::timeout(timeout, self.listener.listen()) => match listened {
                Err(_) => Err(AuthError::Timeout),
                Ok(Ok(code)) => Ok(InteractiveAuth::CapturedAutomatically(code)),
                Ok(Err(ListenError::Unavailable(reason))) => {
                    info!(%reason, "Redirect listener unavailable, manual code entry required");
                    Ok(InteractiveAuth::RequiresManualEntry { reason })
                }
                Ok(Err(ListenError::Failed(message))) => Err(AuthError::Callback(message)),
            },
        };

        if let Err(e) = &result {
            warn!(error = %e, "Authorization attempt abandoned");
            self.settle_state().await;
        }
        result
    }

    /// Exchanges a redirect code for a token and persists it
    ///
    /// Waits for an in-flight sync to release the session first. On failure
    /// a previously stored token stays in use; otherwise the state returns
    /// to `Unauthenticated`. Codes are single-use, so a failed exchange must
    /// be restarted from [`AuthController::begin_interactive_auth`].
    ///
    /// # Errors
    ///
    /// - [`AuthError::Config`] if credentials are incomplete
    /// - [`AuthError::Exchange`] if the provider rejects the code
    /// - [`AuthError::Storage`] if the token cannot be persisted
    pub async fn exchange_code(&self, code: AuthorizationCode) -> Result<(), AuthError> {
        let _session = self.session.lock().await;

        match self.exchange_and_persist(&code).await {
            Ok(token) => {
                *self.token.write().await = Some(token);
                self.state.send_replace(AuthState::Authenticated);
                info!("Authentication completed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Authorization code exchange failed");
                self.settle_state().await;
                Err(e)
            }
        }
    }

    async fn exchange_and_persist(&self, code: &AuthorizationCode) -> Result<Token, AuthError> {
        let credentials = self.credentials().await?;
        let token = self
            .provider
            .exchange_code(&credentials, code)
            .await
            .map_err(|e| AuthError::Exchange(format!("{e:#}")))?;
        self.store
            .save_token(&token)
            .await
            .map_err(|e| AuthError::Storage(format!("{e:#}")))?;
        Ok(token)
    }

    /// Begin, wait for the redirect, and exchange the captured code
    pub async fn run_interactive(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<LoginOutcome, AuthError> {
        self.begin_interactive_auth().await?;
        match self.await_redirect_code(timeout, cancel).await? {
            InteractiveAuth::CapturedAutomatically(code) => {
                self.exchange_code(code).await?;
                Ok(LoginOutcome::Authenticated)
            }
            InteractiveAuth::RequiresManualEntry { reason } => {
                Ok(LoginOutcome::RequiresManualEntry { reason })
            }
        }
    }

    /// Abandons a pending interactive attempt
    ///
    /// A stored token keeps the session authenticated. Does nothing unless
    /// the state is `AuthorizationPending`.
    pub async fn cancel_pending_auth(&self) -> AuthState {
        if self.status() == AuthState::AuthorizationPending {
            info!("Pending authorization abandoned");
            self.settle_state().await;
        }
        self.status()
    }

    /// Takes exclusive use of the token for one sync run
    ///
    /// A pending re-authentication does not block runs: the stored token
    /// stays in use until an exchange replaces it. Refreshes the access
    /// token first when it expires within five minutes and a refresh token
    /// is available.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotAuthenticated`] if no token is stored
    /// - [`AuthError::Refresh`] if the token is expired and cannot be renewed
    /// - [`AuthError::Storage`] if the refreshed token cannot be persisted
    pub async fn acquire_session(&self) -> Result<ActiveSession, AuthError> {
        let guard = self.session.clone().lock_owned().await;
        let mut slot = self.token.write().await;
        let current = slot.clone().ok_or(AuthError::NotAuthenticated)?;

        if !current.expires_within(ChronoDuration::minutes(REFRESH_MARGIN_MINUTES)) {
            return Ok(ActiveSession {
                token: current,
                _guard: guard,
            });
        }

        let Some(refresh_token) = current.refresh_token.clone().filter(|t| !t.is_empty()) else {
            if current.is_expired() {
                return Err(AuthError::Refresh(
                    "access token expired and no refresh token is stored".to_string(),
                ));
            }
            return Ok(ActiveSession {
                token: current,
                _guard: guard,
            });
        };

        debug!("Access token expiring soon, refreshing");
        let credentials = self.credentials().await.map_err(|e| match e {
            AuthError::Config(message) => AuthError::Refresh(message),
            other => other,
        })?;
        let mut fresh = self
            .provider
            .refresh(&credentials, &refresh_token)
            .await
            .map_err(|e| AuthError::Refresh(format!("{e:#}")))?;
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = Some(refresh_token);
        }
        self.store
            .save_token(&fresh)
            .await
            .map_err(|e| AuthError::Storage(format!("{e:#}")))?;

        *slot = Some(fresh.clone());
        info!("Access token refreshed");
        Ok(ActiveSession {
            token: fresh,
            _guard: guard,
        })
    }

    async fn credentials(&self) -> Result<Credentials, AuthError> {
        let config = self
            .store
            .load_config()
            .await
            .map_err(|e| AuthError::Storage(format!("{e:#}")))?;
        config.credentials().ok_or_else(|| {
            AuthError::Config("client ID and client secret must both be set".to_string())
        })
    }

    /// Resolves a pending or failed attempt: a stored token keeps the
    /// session authenticated.
    async fn settle_state(&self) {
        let state = if self.token.read().await.is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };
        self.state.send_replace(state);
    }
}
