//! OAuth2 authorization-code flow for Google identity
//!
//! ## Components
//!
//! - [`GoogleOAuthConfig`] - Endpoints, scopes and redirect port
//! - [`GoogleOAuthProvider`] - Consent URL, code exchange and token refresh
//! - [`LocalCallbackServer`] - Loopback HTTP server for the OAuth redirect
//! - [`SystemBrowser`] - Opens the consent URL in the default browser

use std::convert::Infallible;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use oauth2::{
    basic::BasicClient, AuthType, AuthUrl, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use syncbot_core::{
    config::DEFAULT_REDIRECT_PORT,
    domain::{AuthorizationCode, Credentials, Token},
    ports::{IBrowserLauncher, IOAuthProvider, IRedirectListener, ListenError},
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Google OAuth2 authorization endpoint
pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google OAuth2 token endpoint
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Access limited to files created by this application
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// Lifetime assumed when the token response omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// How long the callback server keeps serving after the code arrived,
/// so the browser receives the result page
const RESPONSE_GRACE: StdDuration = StdDuration::from_secs(2);

type GoogleClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

// ============================================================================
// GoogleOAuthConfig
// ============================================================================

/// Configuration for the Google OAuth2 flow
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub auth_url: String,
    pub token_url: String,
    pub redirect_port: u16,
    pub scopes: Vec<String>,
}

impl Default for GoogleOAuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REDIRECT_PORT)
    }
}

impl GoogleOAuthConfig {
    /// Google endpoints with the Drive file scope
    pub fn new(redirect_port: u16) -> Self {
        Self {
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            redirect_port,
            scopes: vec![DRIVE_FILE_SCOPE.to_string()],
        }
    }

    /// Overrides both endpoints (used against a mock server in tests)
    pub fn with_endpoints(mut self, auth_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.auth_url = auth_url.into();
        self.token_url = token_url.into();
        self
    }

    /// The loopback URI registered as the OAuth redirect
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}", self.redirect_port)
    }
}

// ============================================================================
// GoogleOAuthProvider
// ============================================================================

/// [`IOAuthProvider`] backed by the `oauth2` crate
///
/// Client credentials are supplied per call because the user may change
/// them at any time; they are sent in the request body as Google expects
/// for installed applications.
pub struct GoogleOAuthProvider {
    config: GoogleOAuthConfig,
    http: reqwest::Client,
}

impl GoogleOAuthProvider {
    pub fn new(config: GoogleOAuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            // Following redirects from the token endpoint would leak the code.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &GoogleOAuthConfig {
        &self.config
    }

    fn client(&self, credentials: &Credentials) -> Result<GoogleClient> {
        Ok(BasicClient::new(ClientId::new(credentials.client_id().to_string()))
            .set_client_secret(ClientSecret::new(credentials.client_secret().to_string()))
            .set_auth_uri(AuthUrl::new(self.config.auth_url.clone()).context("Invalid authorization URL")?)
            .set_token_uri(TokenUrl::new(self.config.token_url.clone()).context("Invalid token URL")?)
            .set_redirect_uri(
                RedirectUrl::new(self.config.redirect_uri()).context("Invalid redirect URI")?,
            )
            .set_auth_type(AuthType::RequestBody))
    }
}

fn expires_at(expires_in: Option<StdDuration>) -> chrono::DateTime<Utc> {
    let secs = expires_in
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    Utc::now() + Duration::seconds(secs)
}

#[async_trait]
impl IOAuthProvider for GoogleOAuthProvider {
    fn authorization_url(&self, credentials: &Credentials) -> Result<String> {
        let client = self.client(credentials)?;
        let mut request = client.authorize_url(CsrfToken::new_random);
        for scope in &self.config.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        // Offline access plus forced consent guarantees a refresh token.
        let (url, _csrf) = request
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        debug!("Generated authorization URL");
        Ok(url.to_string())
    }

    async fn exchange_code(
        &self,
        credentials: &Credentials,
        code: &AuthorizationCode,
    ) -> Result<Token> {
        info!("Exchanging authorization code for tokens");

        let response = self
            .client(credentials)?
            .exchange_code(oauth2::AuthorizationCode::new(code.as_str().to_string()))
            .request_async(&self.http)
            .await
            .context("Failed to exchange authorization code")?;

        let token = Token {
            access_token: response.access_token().secret().to_string(),
            refresh_token: response.refresh_token().map(|t| t.secret().to_string()),
            expires_at: expires_at(response.expires_in()),
        };
        if token.refresh_token.is_none() {
            warn!("Token response carried no refresh token");
        }

        info!("Obtained OAuth tokens");
        Ok(token)
    }

    async fn refresh(&self, credentials: &Credentials, refresh_token: &str) -> Result<Token> {
        info!("Refreshing access token");

        let response = self
            .client(credentials)?
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .context("Failed to refresh token")?;

        Ok(Token {
            access_token: response.access_token().secret().to_string(),
            refresh_token: response
                .refresh_token()
                .map(|t| t.secret().to_string())
                .or_else(|| Some(refresh_token.to_string())),
            expires_at: expires_at(response.expires_in()),
        })
    }
}

// ============================================================================
// SystemBrowser
// ============================================================================

/// Opens URLs with the desktop's default browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl IBrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        webbrowser::open(url).context("Failed to open browser")
    }
}

// ============================================================================
// LocalCallbackServer
// ============================================================================

/// What the provider redirect carried
#[derive(Debug, Clone, PartialEq, Eq)]
enum Callback {
    Code(String),
    Denied(String),
}

/// Minimal HTTP server on `127.0.0.1` that waits for the OAuth redirect
///
/// Serves any number of connections (browsers also ask for `/favicon.ico`)
/// until one request carries `code` or `error`, answers it with an HTML
/// page and stops. Dropping the [`listen`](IRedirectListener::listen)
/// future closes the socket.
#[derive(Debug, Clone)]
pub struct LocalCallbackServer {
    addr: SocketAddr,
}

impl LocalCallbackServer {
    pub fn new(port: u16) -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl IRedirectListener for LocalCallbackServer {
    async fn listen(&self) -> Result<AuthorizationCode, ListenError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| ListenError::Unavailable(format!("cannot bind {}: {e}", self.addr)))?;
        info!(addr = %self.addr, "Waiting for OAuth redirect");

        let (tx, mut rx) = mpsc::channel::<Callback>(1);
        let mut connections = JoinSet::new();

        let callback = loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted
                        .map_err(|e| ListenError::Failed(format!("accept failed: {e}")))?;
                    debug!(%peer, "Callback server connection");
                    connections.spawn(serve_connection(stream, tx.clone()));
                }
                Some(callback) = rx.recv() => break callback,
            }
        };

        // Let the browser receive the result page before the tasks are aborted.
        let _ = tokio::time::timeout(RESPONSE_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        match callback {
            Callback::Code(code) => {
                info!("Received OAuth callback with authorization code");
                AuthorizationCode::new(code).map_err(|e| ListenError::Failed(e.to_string()))
            }
            Callback::Denied(reason) => {
                warn!(%reason, "OAuth callback reported an error");
                Err(ListenError::Failed(reason))
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, tx: mpsc::Sender<Callback>) {
    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
        let tx = tx.clone();
        async move {
            let uri = req.uri().to_string();
            let response = match parse_callback(&uri) {
                Some(callback) => {
                    let page = match &callback {
                        Callback::Code(_) => html_response(StatusCode::OK, success_html()),
                        Callback::Denied(reason) => {
                            html_response(StatusCode::BAD_REQUEST, error_html(reason))
                        }
                    };
                    let _ = tx.try_send(callback);
                    page
                }
                None => html_response(StatusCode::NOT_FOUND, error_html("Not found")),
            };
            Ok::<_, Infallible>(response)
        }
    });

    if let Err(e) = http1::Builder::new()
        .keep_alive(false)
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        warn!("Callback server connection error: {}", e);
    }
}

fn html_response(status: StatusCode, html: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(html)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

/// Extracts the authorization code or the provider error from a redirect URI
fn parse_callback(uri: &str) -> Option<Callback> {
    let url = url::Url::parse(&format!("http://localhost{uri}")).ok()?;
    let mut code = None;
    let mut error = None;
    let mut description = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Some(Callback::Denied(match description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        }));
    }
    match code {
        Some(code) if code.trim().is_empty() => {
            Some(Callback::Denied("empty authorization code".to_string()))
        }
        Some(code) => Some(Callback::Code(code)),
        None => None,
    }
}

fn success_html() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>SyncBot - Authentication Successful</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Successful</h1>
    <p>SyncBot can now back up your files to Google Drive.</p>
    <p>You can close this window.</p>
    <script>setTimeout(function() { window.close(); }, 3000);</script>
</body>
</html>"#
        .to_string()
}

fn error_html(message: &str) -> String {
    let escaped = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>SyncBot - Authentication Error</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Error</h1>
    <p>{escaped}</p>
    <p>Please close this window and try again.</p>
</body>
</html>"#
    )
}
