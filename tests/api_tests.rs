/// Router-level tests over the in-memory store and a mocked identity
/// provider. Exercises the HTTP surface end to end without a database.
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use moka::future::Cache;
use rust_localpros_api::auth::AuthService;
use rust_localpros_api::config::Config;
use rust_localpros_api::handlers::{self, AppState};
use rust_localpros_api::store::{DocumentStore, MemoryStore, PROVIDERS_COLLECTION};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(auth_base_url: String) -> Config {
    Config {
        database_url: "postgresql://test".to_string(),
        port: 8080,
        auth_base_url,
        auth_api_key: "test_key".to_string(),
        session_ttl_secs: 60,
    }
}

/// Builds the app the way `main` does, minus the outer middleware layers.
fn test_app(store: Arc<MemoryStore>, auth_base_url: String) -> (Router, Arc<AppState>) {
    let config = test_config(auth_base_url);
    let auth = AuthService::new(&config).unwrap();
    let state = Arc::new(AppState {
        store: store as Arc<dyn DocumentStore>,
        auth,
        config,
        session_cache: Cache::builder()
            .time_to_live(Duration::from_secs(60))
            .max_capacity(100)
            .build(),
    });
    let router = Router::new()
        .route("/health", axum::routing::get(handlers::health))
        .merge(handlers::api_routes())
        .with_state(state.clone());
    (router, state)
}

async fn mount_identity(server: &MockServer, user_id: &str, display_name: Option<&str>) {
    let mut user = json!({ "localId": user_id });
    if let Some(name) = display_name {
        user["displayName"] = json!(name);
    }
    Mock::given(method("POST"))
        .and(path("/v1/accounts:lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "users": [user] })))
        .mount(server)
        .await;
}

async fn seed_provider(store: &MemoryStore, uid: &str, service: &str, state_name: &str) {
    store
        .insert(
            PROVIDERS_COLLECTION,
            uid,
            json!({
                "name": format!("Provider {}", uid),
                "service": service,
                "locality": "Anna Nagar",
                "district": "Chennai",
                "state": state_name,
                "recommendCount": 0,
                "recommendedBy": []
            }),
        )
        .await;
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let store = Arc::new(MemoryStore::new());
    let (app, _) = test_app(store, "http://127.0.0.1:1".to_string());

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["service"], json!("rust-localpros-api"));
}

#[tokio::test]
async fn listing_filters_by_category_state_and_search() {
    let store = Arc::new(MemoryStore::new());
    seed_provider(&store, "p1", "Home Tutor", "Tamil Nadu").await;
    seed_provider(&store, "p2", "Plumber", "Tamil Nadu").await;
    seed_provider(&store, "p3", "Home Tutor", "Kerala").await;
    let (app, _) = test_app(store, "http://127.0.0.1:1".to_string());

    // Category slug match
    let response = app
        .clone()
        .oneshot(get("/api/v1/providers?service=home-tutor"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    // Category + state
    let response = app
        .clone()
        .oneshot(get("/api/v1/providers?service=home-tutor&state=Kerala"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["uid"], json!("p3"));

    // Free-text search across display fields
    let response = app
        .clone()
        .oneshot(get("/api/v1/providers?q=plumb"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["uid"], json!("p2"));

    // No filters: everything
    let response = app.oneshot(get("/api/v1/providers")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn provider_detail_reads_persisted_aggregates() {
    let store = Arc::new(MemoryStore::new());
    seed_provider(&store, "p1", "Plumber", "Tamil Nadu").await;
    let (app, _) = test_app(store, "http://127.0.0.1:1".to_string());

    let response = app
        .clone()
        .oneshot(get("/api/v1/providers/p1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["uid"], json!("p1"));
    assert_eq!(body["recommendCount"], json!(0));
    assert_eq!(body["avgRating"], json!(0.0));
    assert_eq!(body["hasRecommended"], json!(false));
    assert_eq!(body["reviews"], json!([]));

    let response = app.oneshot(get("/api/v1/providers/ghost")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn anonymous_recommend_is_unauthorized_and_unchanged() {
    let store = Arc::new(MemoryStore::new());
    seed_provider(&store, "p1", "Plumber", "Tamil Nadu").await;
    let (app, state) = test_app(store, "http://127.0.0.1:1".to_string());

    let response = app
        .oneshot(post("/api/v1/providers/p1/recommend", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let doc = state
        .store
        .get(PROVIDERS_COLLECTION, "p1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.data["recommendCount"], json!(0));
}

#[tokio::test]
async fn authenticated_recommend_flow_with_cached_session() {
    let mock_server = MockServer::start().await;
    // A single upstream lookup must serve both requests; the second one
    // hits the session cache.
    Mock::given(method("POST"))
        .and(path("/v1/accounts:lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{ "localId": "u3", "displayName": "Asha" }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    seed_provider(&store, "p2", "Plumber", "Tamil Nadu").await;
    let (app, _) = test_app(store, mock_server.uri());

    let response = app
        .clone()
        .oneshot(post("/api/v1/providers/p2/recommend", Some("tok"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["recommendCount"], json!(1));

    // Same user again: conflict, count unchanged
    let response = app
        .clone()
        .oneshot(post("/api/v1/providers/p2/recommend", Some("tok"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.oneshot(get("/api/v1/providers/p2")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["recommendCount"], json!(1));
}

#[tokio::test]
async fn review_flow_updates_average_and_rejects_duplicates() {
    let mock_server = MockServer::start().await;
    mount_identity(&mock_server, "u1", Some("Asha")).await;

    let store = Arc::new(MemoryStore::new());
    seed_provider(&store, "p1", "Plumber", "Tamil Nadu").await;
    let (app, _) = test_app(store, mock_server.uri());

    // Invalid rating first: rejected, nothing stored
    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/providers/p1/reviews",
            Some("tok"),
            Some(json!({ "rating": 6 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Valid review
    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/providers/p1/reviews",
            Some("tok"),
            Some(json!({
                "rating": 4,
                "tags": ["Great Service", "Bogus Tag"],
                "comment": "Quick and tidy"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["avgRating"], json!(4.0));
    assert!(body["reviewId"].as_str().is_some());

    // Duplicate from the same account
    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/providers/p1/reviews",
            Some("tok"),
            Some(json!({ "rating": 5 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // The detail read shows the stored aggregate and the filtered tags
    let response = app.oneshot(get("/api/v1/providers/p1")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["avgRating"], json!(4.0));
    let reviews = body["reviews"].as_array().unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0]["userName"], json!("Asha"));
    assert_eq!(reviews[0]["tags"], json!(["Great Service"]));
}

#[tokio::test]
async fn detail_marks_has_recommended_for_the_session_user() {
    let mock_server = MockServer::start().await;
    mount_identity(&mock_server, "u7", None).await;

    let store = Arc::new(MemoryStore::new());
    store
        .insert(
            PROVIDERS_COLLECTION,
            "p9",
            json!({
                "name": "Meena",
                "service": "Electrician",
                "state": "Tamil Nadu",
                "recommendCount": 2,
                "recommendedBy": ["u7", "u8"]
            }),
        )
        .await;
    let (app, _) = test_app(store, mock_server.uri());

    let response = app
        .clone()
        .oneshot({
            Request::builder()
                .uri("/api/v1/providers/p9")
                .header(header::AUTHORIZATION, "Bearer tok")
                .body(Body::empty())
                .unwrap()
        })
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["hasRecommended"], json!(true));
    assert_eq!(body["recommendCount"], json!(2));

    // Anonymous readers see the flag unset
    let response = app.oneshot(get("/api/v1/providers/p9")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["hasRecommended"], json!(false));
}

#[tokio::test]
async fn poisoned_session_cache_entry_forces_reverification() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/accounts:lookup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [{ "localId": "u1", "displayName": "Asha" }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    seed_provider(&store, "p1", "Plumber", "Tamil Nadu").await;
    let (app, state) = test_app(store, mock_server.uri());

    // A tampered cache entry must not be trusted; the token goes back to
    // the identity provider.
    state
        .session_cache
        .insert(
            "tok".to_string(),
            r#"{"data":"{\"user_id\":\"intruder\",\"display_name\":null}","checksum":"0000"}"#
                .to_string(),
        )
        .await;

    let response = app
        .oneshot(post("/api/v1/providers/p1/recommend", Some("tok"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let doc = state
        .store
        .get(PROVIDERS_COLLECTION, "p1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.data["recommendedBy"], json!(["u1"]));
}

#[tokio::test]
async fn reviews_listing_404s_for_unknown_provider() {
    let store = Arc::new(MemoryStore::new());
    let (app, _) = test_app(store, "http://127.0.0.1:1".to_string());

    let response = app
        .oneshot(get("/api/v1/providers/ghost/reviews"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
