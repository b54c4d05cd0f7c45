//! Shared helpers for the Google API integration tests

use std::time::Duration;

use syncbot_core::domain::Credentials;
use syncbot_drive::{DriveClient, GoogleDriveProvider, GoogleOAuthConfig, GoogleOAuthProvider, RetryPolicy};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ACCESS_TOKEN: &str = "ya29.test-access";

pub fn credentials() -> Credentials {
    Credentials::new("client-1.apps.googleusercontent.com", "client-secret-1")
}

/// An OAuth provider whose endpoints point at `server`
pub fn oauth_provider(server: &MockServer) -> GoogleOAuthProvider {
    let config = GoogleOAuthConfig::new(14242)
        .with_endpoints(format!("{}/auth", server.uri()), format!("{}/token", server.uri()));
    GoogleOAuthProvider::new(config).expect("provider")
}

/// A Drive client pointing at `server` with a fast retry policy
pub fn drive_client(server: &MockServer) -> DriveClient {
    DriveClient::with_base_urls(server.uri(), format!("{}/upload", server.uri())).with_retry_policy(
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        },
    )
}

pub fn drive_provider(server: &MockServer) -> GoogleDriveProvider {
    GoogleDriveProvider::new(drive_client(server))
}

/// Mounts `GET /files` returning the given IDs
pub async fn mount_search(server: &MockServer, ids: &[&str]) {
    let files: Vec<_> = ids.iter().map(|id| serde_json::json!({ "id": id })).collect();
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": files })))
        .mount(server)
        .await;
}

/// Mounts `PATCH /upload/files/{id}` accepting any content
pub async fn mount_upload(server: &MockServer, id: &str) {
    Mock::given(method("PATCH"))
        .and(path(format!("/upload/files/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": id })))
        .mount(server)
        .await;
}
