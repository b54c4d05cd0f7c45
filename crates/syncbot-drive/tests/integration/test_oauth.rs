//! Token exchange and refresh against a mock Google token endpoint

use syncbot_core::{domain::AuthorizationCode, ports::IOAuthProvider};
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

use crate::common;

#[tokio::test]
async fn test_exchange_code_returns_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=valid-code"))
        .and(body_string_contains("client_secret=client-secret-1"))
        .and(body_string_contains("redirect_uri=http%3A%2F%2Flocalhost%3A14242"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.fresh",
            "token_type": "Bearer",
            "expires_in": 3599,
            "refresh_token": "refresh-1",
            "scope": "https://www.googleapis.com/auth/drive.file"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = common::oauth_provider(&server);
    let code = AuthorizationCode::new("valid-code").unwrap();
    let token = provider
        .exchange_code(&common::credentials(), &code)
        .await
        .expect("exchange failed");

    assert_eq!(token.access_token, "ya29.fresh");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
    let remaining = token.expires_at - chrono::Utc::now();
    assert!(remaining > chrono::Duration::minutes(55));
}

#[tokio::test]
async fn test_rejected_code_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Bad Request"
        })))
        .mount(&server)
        .await;

    let provider = common::oauth_provider(&server);
    let code = AuthorizationCode::new("stale-code").unwrap();
    let err = provider
        .exchange_code(&common::credentials(), &code)
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("invalid_grant"));
}

#[tokio::test]
async fn test_refresh_keeps_previous_refresh_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.refreshed",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = common::oauth_provider(&server);
    let token = provider
        .refresh(&common::credentials(), "refresh-1")
        .await
        .expect("refresh failed");

    assert_eq!(token.access_token, "ya29.refreshed");
    assert_eq!(token.refresh_token.as_deref(), Some("refresh-1"));
}

#[tokio::test]
async fn test_authorization_url_targets_configured_endpoint() {
    let server = MockServer::start().await;
    let provider = common::oauth_provider(&server);

    let url = provider.authorization_url(&common::credentials()).unwrap();
    assert!(url.starts_with(&format!("{}/auth?", server.uri())));
    assert!(url.contains("access_type=offline"));
}
