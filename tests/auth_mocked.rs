/// Integration tests for the identity provider client with a mocked backend.
/// Exercises token verification without hitting a real auth service.
use rust_localpros_api::auth::AuthService;
use rust_localpros_api::config::Config;
use rust_localpros_api::errors::AppError;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create test config
fn create_test_config(auth_base_url: String) -> Config {
    Config {
        database_url: "postgresql://test".to_string(),
        port: 8080,
        auth_base_url,
        auth_api_key: "test_key".to_string(),
        session_ttl_secs: 60,
    }
}

#[tokio::test]
async fn test_valid_token_resolves_identity() {
    let mock_server = MockServer::start().await;

    let mock_response = serde_json::json!({
        "users": [
            { "localId": "u1", "displayName": "Asha" }
        ]
    });

    Mock::given(method("POST"))
        .and(path("/v1/accounts:lookup"))
        .and(query_param("key", "test_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = AuthService::new(&config).unwrap();

    let identity = service.verify_token("valid-token").await.unwrap();

    let identity = identity.expect("expected an identity");
    assert_eq!(identity.user_id, "u1");
    assert_eq!(identity.display_name.as_deref(), Some("Asha"));
}

#[tokio::test]
async fn test_missing_display_name_is_none() {
    let mock_server = MockServer::start().await;

    let mock_response = serde_json::json!({
        "users": [
            { "localId": "u2" }
        ]
    });

    Mock::given(method("POST"))
        .and(path("/v1/accounts:lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = AuthService::new(&config).unwrap();

    let identity = service.verify_token("valid-token").await.unwrap().unwrap();
    assert_eq!(identity.user_id, "u2");
    assert_eq!(identity.display_name, None);
}

#[tokio::test]
async fn test_empty_display_name_is_none() {
    let mock_server = MockServer::start().await;

    let mock_response = serde_json::json!({
        "users": [
            { "localId": "u3", "displayName": "" }
        ]
    });

    Mock::given(method("POST"))
        .and(path("/v1/accounts:lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&mock_response))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = AuthService::new(&config).unwrap();

    let identity = service.verify_token("valid-token").await.unwrap().unwrap();
    assert_eq!(identity.display_name, None);
}

#[tokio::test]
async fn test_no_users_means_anonymous() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"users": []})))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = AuthService::new(&config).unwrap();

    let identity = service.verify_token("unknown-token").await.unwrap();
    assert!(identity.is_none());
}

#[tokio::test]
async fn test_rejected_token_means_anonymous() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:lookup"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {"message": "INVALID_ID_TOKEN"}
        })))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = AuthService::new(&config).unwrap();

    let identity = service.verify_token("expired-token").await.unwrap();
    assert!(identity.is_none());
}

#[tokio::test]
async fn test_provider_outage_surfaces_as_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:lookup"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = AuthService::new(&config).unwrap();

    let result = service.verify_token("any-token").await;
    assert!(matches!(result, Err(AppError::ExternalApiError(_))));
}

#[tokio::test]
async fn test_malformed_payload_surfaces_as_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/accounts:lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let service = AuthService::new(&config).unwrap();

    let result = service.verify_token("any-token").await;
    assert!(matches!(result, Err(AppError::ExternalApiError(_))));
}
