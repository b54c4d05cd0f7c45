//! Folder and file operations against a mock Drive v3 API

use syncbot_core::ports::IRemoteDrive;
use syncbot_drive::DriveError;
use wiremock::{
    matchers::{body_partial_json, body_string, header, method, path, query_param, query_param_contains},
    Mock, MockServer, ResponseTemplate,
};

use crate::common::{self, ACCESS_TOKEN};

// ============================================================================
// Folders
// ============================================================================

#[tokio::test]
async fn test_ensure_folder_reuses_existing_folder() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(header("authorization", "Bearer ya29.test-access"))
        .and(query_param_contains("q", "name='sync-bot-backups'"))
        .and(query_param_contains("q", "application/vnd.google-apps.folder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [{ "id": "folder-1" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let drive = common::drive_provider(&server);
    let id = drive
        .ensure_folder(ACCESS_TOKEN, "sync-bot-backups", None)
        .await
        .unwrap();
    assert_eq!(id, "folder-1");
}

#[tokio::test]
async fn test_ensure_folder_creates_missing_subfolder() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param_contains("q", "'parent-1' in parents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .and(body_partial_json(serde_json::json!({
            "name": "docs",
            "mimeType": "application/vnd.google-apps.folder",
            "parents": ["parent-1"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "docs-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let drive = common::drive_provider(&server);
    let id = drive
        .ensure_folder(ACCESS_TOKEN, "docs", Some("parent-1"))
        .await
        .unwrap();
    assert_eq!(id, "docs-1");
}

#[tokio::test]
async fn test_folder_names_are_escaped_in_queries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param_contains("q", r"name='Bob\'s files'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [{ "id": "bob-1" }]
        })))
        .mount(&server)
        .await;

    let client = common::drive_client(&server);
    let found = client
        .find_folder(ACCESS_TOKEN, "Bob's files", None)
        .await
        .unwrap();
    assert_eq!(found.as_deref(), Some("bob-1"));
}

// ============================================================================
// Uploads
// ============================================================================

#[tokio::test]
async fn test_upload_creates_then_writes_new_file() {
    let server = MockServer::start().await;
    common::mount_search(&server, &[]).await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .and(body_partial_json(serde_json::json!({
            "name": "notes.txt",
            "parents": ["folder-1"],
            "mimeType": "text/plain"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "file-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/upload/files/file-1"))
        .and(query_param("uploadType", "media"))
        .and(header("content-type", "text/plain"))
        .and(body_string("hello drive"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "file-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let drive = common::drive_provider(&server);
    let id = drive
        .upload_file(ACCESS_TOKEN, "folder-1", "notes.txt", b"hello drive".to_vec())
        .await
        .unwrap();
    assert_eq!(id, "file-1");
}

#[tokio::test]
async fn test_upload_updates_existing_file_in_place() {
    let server = MockServer::start().await;
    common::mount_search(&server, &["existing-1"]).await;
    common::mount_upload(&server, "existing-1").await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let drive = common::drive_provider(&server);
    let id = drive
        .upload_file(ACCESS_TOKEN, "folder-1", "report.pdf", vec![1, 2, 3])
        .await
        .unwrap();
    assert_eq!(id, "existing-1");
}

// ============================================================================
// Errors and retry
// ============================================================================

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": { "code": 401, "message": "Invalid Credentials" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let drive = common::drive_provider(&server);
    let err = drive
        .ensure_folder(ACCESS_TOKEN, "backups", None)
        .await
        .unwrap_err();

    match err.downcast_ref::<DriveError>() {
        Some(DriveError::Unauthorized(message)) => assert_eq!(message, "Invalid Credentials"),
        other => panic!("expected Unauthorized, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    common::mount_search(&server, &["folder-1"]).await;

    let client = common::drive_client(&server);
    let found = client.find_folder(ACCESS_TOKEN, "backups", None).await.unwrap();
    assert_eq!(found.as_deref(), Some("folder-1"));
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/upload/files/file-1"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    common::mount_upload(&server, "file-1").await;

    let client = common::drive_client(&server);
    client
        .update_content(ACCESS_TOKEN, "file-1", b"x".to_vec(), "text/plain")
        .await
        .expect("upload should succeed after retry");
}

#[tokio::test]
async fn test_persistent_server_error_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend down"))
        .expect(3)
        .mount(&server)
        .await;

    let client = common::drive_client(&server);
    let err = client
        .find_folder(ACCESS_TOKEN, "backups", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DriveError::ServerError(ref m) if m.contains("backend down")));
}

#[tokio::test]
async fn test_bad_request_surfaces_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": { "code": 400, "message": "Invalid field selection" }
        })))
        .mount(&server)
        .await;

    let client = common::drive_client(&server);
    let err = client
        .create_folder(ACCESS_TOKEN, "backups", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DriveError::Api { status: 400, ref message } if message == "Invalid field selection"
    ));
}
