//! End-to-end admission decisions over the HTTP client.

use chrono::Utc;
use crowdgate::clock::iso8601z;
use crowdgate::crypto::signature::SignatureVerifier;
use crowdgate::{
    Action, ApiClient, CrowdgateConfig, GateKeeper, PatternType, RoomCache, RoomConfig,
    ValidateRequest,
};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRIVATE_KEY: &str = "priv-key";

fn sale_room() -> RoomConfig {
    serde_json::from_value(json!({
        "slug": "sale",
        "domain": "https://shop.test",
        "urlPattern": "/products",
        "patternType": "contains",
        "queueActivatesOn": "2023-01-01T00:00:00Z",
        "timeout": 30
    }))
    .unwrap()
}

fn gatekeeper(uri: &str) -> GateKeeper {
    let mut config = CrowdgateConfig::new("pub-key", PRIVATE_KEY);
    config.api_endpoint = uri.to_string();
    config.waiting_room_endpoint = "https://wait.test".to_string();
    let api = Arc::new(ApiClient::with_cache(&config, Arc::new(RoomCache::new())));
    GateKeeper::with_api(config, api).unwrap()
}

async fn mount_rooms(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/rooms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [serde_json::to_value(sale_room()).unwrap()]
        })))
        .mount(server)
        .await;
}

async fn token_calls(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().starts_with("/v1/requests/"))
        .count()
}

#[tokio::test(flavor = "multi_thread")]
async fn promoted_visitor_returns_with_cookie_only() {
    let server = MockServer::start().await;
    mount_rooms(&server).await;

    let requested = iso8601z(&Utc::now());
    let generated_at = chrono::DateTime::parse_from_rfc3339(&requested)
        .unwrap()
        .with_timezone(&Utc);
    let hash = SignatureVerifier::new(PRIVATE_KEY).sign(&sale_room(), "tok-1", &generated_at);

    Mock::given(method("POST"))
        .and(path("/v1/requests/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {
                "status": 1,
                "token": "tok-1",
                "promoted": true,
                "slug": "sale",
                "responseID": "resp-1",
                "requested": requested,
                "hash": hash
            }
        })))
        .mount(&server)
        .await;

    let uri = server.uri();
    let (first, second) = tokio::task::spawn_blocking(move || {
        let gk = gatekeeper(&uri);
        let first = gk
            .validate(&ValidateRequest::new("https://shop.test/products/1"))
            .unwrap();
        let cookie = first.cookie_value.clone().unwrap();

        let second = gk
            .validate(&ValidateRequest {
                cookie: &cookie,
                ..ValidateRequest::new("https://shop.test/products/2")
            })
            .unwrap();
        (first, second)
    })
    .await
    .unwrap();

    assert_eq!(first.action, Action::Allow);
    assert!(first.set_cookie);
    assert_eq!(second.action, Action::Allow);
    assert_eq!(second.token.as_deref(), Some("tok-1"));
    assert_eq!(token_calls(&server).await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn queued_visitor_redirected_to_waiting_room() {
    let server = MockServer::start().await;
    mount_rooms(&server).await;

    Mock::given(method("POST"))
        .and(path("/v1/requests/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": {"status": 1, "token": "tok-q", "promoted": false, "slug": "sale"}
        })))
        .mount(&server)
        .await;

    let uri = server.uri();
    let result = tokio::task::spawn_blocking(move || {
        gatekeeper(&uri).validate(&ValidateRequest::new("https://shop.test/products/1"))
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(result.action, Action::Redirect);
    assert_eq!(
        result.redirect_url.as_deref(),
        Some("https://wait.test/sale?url=https%3A%2F%2Fshop.test%2Fproducts%2F1&ch-code=&ch-id=tok-q&ch-public-key=pub-key")
    );
    assert_eq!(result.no_cache_headers().len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn unprotected_and_excluded_paths_skip_token_api() {
    let server = MockServer::start().await;
    mount_rooms(&server).await;

    let uri = server.uri();
    let (about, image) = tokio::task::spawn_blocking(move || {
        let gk = gatekeeper(&uri);
        let about = gk.validate(&ValidateRequest::new("https://shop.test/about")).unwrap();
        let image = gk
            .validate(&ValidateRequest::new("https://shop.test/products/hero.png"))
            .unwrap();
        (about, image)
    })
    .await
    .unwrap();

    assert!(about.is_allowed());
    assert!(!about.set_cookie);
    assert!(image.is_allowed());
    assert!(!image.set_cookie);
    assert_eq!(token_calls(&server).await, 0);
    assert_eq!(sale_room().pattern_type, PatternType::Contains);
}
