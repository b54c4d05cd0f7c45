//! Google Drive v3 API client
//!
//! A typed HTTP client for the handful of Drive endpoints the sync engine
//! needs: folder lookup/creation, file lookup/creation and content upload.
//! Transient failures (429, 5xx, network) are retried with exponential
//! backoff; everything else surfaces as a [`DriveError`] immediately.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use syncbot_drive::client::DriveClient;
//!
//! # async fn example() -> Result<(), syncbot_drive::DriveError> {
//! let client = DriveClient::new();
//! let folder = client.create_folder("ya29.token", "backups", None).await?;
//! println!("created {folder}");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::DriveError;

/// Base URL for Drive v3 metadata requests
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Base URL for Drive v3 media uploads
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Retry-After used when a 429 carries no usable header
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Longest Retry-After honoured
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

// ============================================================================
// Drive API response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileRef>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// RetryPolicy
// ============================================================================

/// Attempts and backoff for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

// ============================================================================
// DriveClient
// ============================================================================

/// HTTP client for Google Drive v3
///
/// Holds no credentials; every call takes the bearer token to use, so a
/// refreshed token applies to the next request without rebuilding the client.
#[derive(Debug, Clone)]
pub struct DriveClient {
    client: Client,
    api_url: String,
    upload_url: String,
    retry: RetryPolicy,
}

impl Default for DriveClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveClient {
    pub fn new() -> Self {
        Self::with_base_urls(DRIVE_API_BASE, DRIVE_UPLOAD_BASE)
    }

    /// Creates a client with custom base URLs (useful for testing)
    pub fn with_base_urls(api_url: impl Into<String>, upload_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
            upload_url: upload_url.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Finds a non-trashed folder by name, under `parent_id` when given
    pub async fn find_folder(
        &self,
        access_token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<String>, DriveError> {
        let mut query = format!(
            "name='{}' and mimeType='{FOLDER_MIME_TYPE}' and trashed=false",
            escape_query(name)
        );
        if let Some(parent) = parent_id {
            query.push_str(&format!(" and '{}' in parents", escape_query(parent)));
        }
        self.find_one(access_token, &query).await
    }

    /// Creates a folder, at the drive root when `parent_id` is `None`
    pub async fn create_folder(
        &self,
        access_token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, DriveError> {
        let mut metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        if let Some(parent) = parent_id {
            metadata["parents"] = serde_json::json!([parent]);
        }
        let id = self.create(access_token, &metadata).await?;
        info!(name, id = %id, "Created Drive folder");
        Ok(id)
    }

    /// Finds a non-trashed file by name directly under `parent_id`
    pub async fn find_file(
        &self,
        access_token: &str,
        name: &str,
        parent_id: &str,
    ) -> Result<Option<String>, DriveError> {
        let query = format!(
            "name='{}' and '{}' in parents and mimeType!='{FOLDER_MIME_TYPE}' and trashed=false",
            escape_query(name),
            escape_query(parent_id)
        );
        self.find_one(access_token, &query).await
    }

    /// Creates an empty file entry; content follows with [`update_content`](Self::update_content)
    pub async fn create_file(
        &self,
        access_token: &str,
        name: &str,
        parent_id: &str,
        mime_type: &str,
    ) -> Result<String, DriveError> {
        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent_id],
            "mimeType": mime_type,
        });
        self.create(access_token, &metadata).await
    }

    /// Replaces the content of an existing file
    pub async fn update_content(
        &self,
        access_token: &str,
        file_id: &str,
        data: Vec<u8>,
        mime_type: &str,
    ) -> Result<(), DriveError> {
        let url = format!("{}/files/{file_id}", self.upload_url);
        let bytes = data.len();
        self.send_with_retry("upload content", || {
            self.client
                .patch(&url)
                .bearer_auth(access_token)
                .query(&[("uploadType", "media")])
                .header(CONTENT_TYPE, mime_type)
                .body(data.clone())
        })
        .await?;
        debug!(file_id, bytes, "Uploaded file content");
        Ok(())
    }

    async fn find_one(&self, access_token: &str, query: &str) -> Result<Option<String>, DriveError> {
        let url = format!("{}/files", self.api_url);
        let response = self
            .send_with_retry("search", || {
                self.client
                    .get(&url)
                    .bearer_auth(access_token)
                    .query(&[("q", query), ("fields", "files(id)"), ("spaces", "drive")])
            })
            .await?;
        let list: FileList = response
            .json()
            .await
            .map_err(|e| DriveError::InvalidResponse(format!("file list: {e}")))?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create(
        &self,
        access_token: &str,
        metadata: &serde_json::Value,
    ) -> Result<String, DriveError> {
        let url = format!("{}/files", self.api_url);
        let response = self
            .send_with_retry("create", || {
                self.client
                    .post(&url)
                    .bearer_auth(access_token)
                    .query(&[("fields", "id")])
                    .json(metadata)
            })
            .await?;
        let created: FileRef = response
            .json()
            .await
            .map_err(|e| DriveError::InvalidResponse(format!("created file: {e}")))?;
        Ok(created.id)
    }

    /// Sends the request built by `build`, retrying transient failures
    async fn send_with_retry<F>(&self, what: &str, build: F) -> Result<Response, DriveError>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match build().send().await {
                Ok(response) => check_status(response).await,
                Err(e) => Err(DriveError::NetworkError(e)),
            };

            match result {
                Ok(response) => {
                    if attempt > 1 {
                        info!(what, attempt, "Request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let mut delay = self.retry.delay_for(attempt);
                    if let DriveError::TooManyRequests { retry_after } = &e {
                        delay = delay.max(*retry_after);
                    }
                    warn!(
                        what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient Drive error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Maps a non-success response to a [`DriveError`]
async fn check_status(response: Response) -> Result<Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .map(parse_retry_after)
        .unwrap_or(DEFAULT_RETRY_AFTER);
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or(body);

    Err(match status {
        StatusCode::UNAUTHORIZED => DriveError::Unauthorized(message),
        StatusCode::FORBIDDEN => DriveError::Forbidden(message),
        StatusCode::NOT_FOUND => DriveError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => DriveError::TooManyRequests { retry_after },
        s if s.is_server_error() => DriveError::ServerError(format!("HTTP {}: {message}", s.as_u16())),
        s => DriveError::Api {
            status: s.as_u16(),
            message,
        },
    })
}

/// Parses a Retry-After value given in seconds, capped at one minute
fn parse_retry_after(value: &str) -> Duration {
    value
        .trim()
        .parse::<u64>()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Escapes a value for a single-quoted Drive query literal
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
