// Tests for `OverseerrClient` against a mock Overseerr server.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use overseerr_provider::{ClientError, MainSettings, OverseerrClient};

// ── Helpers ─────────────────────────────────────────────────────────

const API_KEY: &str = "test-api-key";

async fn setup() -> (MockServer, OverseerrClient) {
    let server = MockServer::start().await;
    let client = OverseerrClient::new(&server.uri(), API_KEY).unwrap();
    (server, client)
}

fn main_settings_body(title: &str) -> serde_json::Value {
    json!({
        "apiKey": "server-side-key",
        "appLanguage": "en",
        "applicationTitle": title,
        "applicationUrl": "",
        "trustProxy": false,
        "csrfProtection": false,
        "hideAvailable": false,
        "partialRequestsEnabled": true,
        "localLogin": true,
        "newPlexLogin": true,
        "defaultPermissions": 32,
        "region": "",
        "originalLanguage": ""
    })
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_get_main_settings() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/settings/main"))
        .and(header("X-Api-Key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(main_settings_body("Overseerr")))
        .expect(1)
        .mount(&server)
        .await;

    let settings = client.get_main_settings().await.unwrap();

    assert_eq!(settings.application_title.as_deref(), Some("Overseerr"));
    assert_eq!(settings.app_language.as_deref(), Some("en"));
    assert_eq!(settings.partial_requests_enabled, Some(true));
    assert_eq!(settings.default_permissions, Some(32.0));
}

#[tokio::test]
async fn test_create_main_settings_posts_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/settings/main"))
        .and(header("X-Api-Key", API_KEY))
        .and(body_partial_json(json!({
            "applicationTitle": "overseerr",
            "trustProxy": true,
            "defaultPermissions": 2.0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(main_settings_body("overseerr")))
        .expect(1)
        .mount(&server)
        .await;

    let request = MainSettings {
        api_key: Some("never-sent".to_string()),
        application_title: Some("overseerr".to_string()),
        trust_proxy: Some(true),
        default_permissions: Some(2.0),
        ..Default::default()
    };
    let response = client.create_main_settings(&request).await.unwrap();
    assert_eq!(response.application_title.as_deref(), Some("overseerr"));

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("apiKey").is_none());
}

#[tokio::test]
async fn test_base_url_trailing_slash() {
    let server = MockServer::start().await;
    let client = OverseerrClient::new(&format!("{}/", server.uri()), API_KEY).unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v1/settings/main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let settings = client.get_main_settings().await.unwrap();
    assert_eq!(settings, MainSettings::default());
}

// ── Error tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_maps_to_invalid_api_key() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/settings/main"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthorized"})))
        .mount(&server)
        .await;

    let err = client.get_main_settings().await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidApiKey));
}

#[tokio::test]
async fn test_forbidden_maps_to_invalid_api_key() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/settings/main"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = client
        .create_main_settings(&MainSettings::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidApiKey));
}

#[tokio::test]
async fn test_server_error_message_from_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/settings/main"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"message": "Something went wrong."})),
        )
        .mount(&server)
        .await;

    let err = client.get_main_settings().await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "Something went wrong.");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_plain_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/settings/main"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client.get_main_settings().await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 502);
            assert_eq!(message, "bad gateway");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_json_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/settings/main"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let err = client.get_main_settings().await.unwrap_err();
    match err {
        ClientError::Deserialization { body, .. } => assert_eq!(body, "<html>login</html>"),
        other => panic!("expected Deserialization error, got {other:?}"),
    }
}
