//! Upgrade request handling: origin checks and rejected upgrades

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use elif_channels::testing::TestServer;
use elif_channels::*;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Error as WsError;
use tower::ServiceExt;

fn registry_with_origins() -> ChannelRegistry {
    let config = ChannelConfig::default()
        .with_origin_policy(OriginPolicy::allow_list(["https://good.example"]));
    let registry = ChannelRegistry::with_config(config);
    registry
        .register_channel("chat", "/chat", testing::RecordingHandler::new())
        .unwrap();
    registry
}

#[tokio::test]
async fn test_disallowed_origin_is_forbidden() {
    let registry = registry_with_origins();
    let server = TestServer::spawn(registry.router()).await.unwrap();

    let mut request = server.ws_url("/chat").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://evil.example".parse().unwrap());

    match connect_async(request).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), StatusCode::FORBIDDEN),
        other => panic!("expected HTTP 403, got {:?}", other.map(|(_, response)| response.status())),
    }

    let channel = registry.channel("chat").unwrap();
    assert_eq!(channel.client_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_allowed_and_missing_origins_connect() {
    let registry = registry_with_origins();
    let server = TestServer::spawn(registry.router()).await.unwrap();

    let mut request = server.ws_url("/chat").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://GOOD.example".parse().unwrap());
    tokio_test::assert_ok!(connect_async(request).await);

    tokio_test::assert_ok!(connect_async(server.ws_url("/chat")).await);
}

#[tokio::test]
async fn test_plain_get_is_rejected() {
    let registry = registry_with_origins();

    let response = registry
        .router()
        .oneshot(Request::builder().uri("/chat").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_non_get_method_is_rejected() {
    let registry = registry_with_origins();

    let response = registry
        .router()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/chat")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let registry = registry_with_origins();

    let response = registry
        .router()
        .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
