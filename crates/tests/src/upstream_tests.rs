//! Upstream failure handling and request forwarding.

use crate::mock_infrastructure::{
    build_gateway, cache_header, chat_request, send, test_config, UpstreamMockBuilder,
};
use axum::http::StatusCode;
use mockito::Matcher;
use serial_test::serial;
use std::time::Duration;

fn error_code(body: &[u8]) -> String {
    let json: serde_json::Value = serde_json::from_slice(body).unwrap();
    json["code"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
#[serial]
async fn test_connection_refused_maps_to_bad_gateway() {
    let (app, state) = build_gateway(test_config("http://127.0.0.1:1"));

    let (status, _, body) = send(&app, chat_request(Some("X"), "{}")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(&body), "PROXY_ERROR");
    assert_eq!(state.proxy_engine.stats().snapshot().upstream_errors, 1);
    assert!(state.proxy_engine.cache().is_empty());
}

#[tokio::test]
#[serial]
async fn test_slow_upstream_times_out_without_caching() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let _mock = upstream.mock_slow_chat_completion(Duration::from_secs(2)).await;
    let mut config = test_config(&upstream.url());
    config.upstream.timeout_secs = 1;
    let (app, state) = build_gateway(config);

    let (status, _, body) = send(&app, chat_request(Some("X"), "{}")).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(error_code(&body), "UPSTREAM_TIMEOUT");
    assert!(state.proxy_engine.cache().is_empty());
}

#[tokio::test]
#[serial]
async fn test_configured_api_key_replaces_client_credential() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let mock = upstream
        .mock_chat_completion_with_header(
            "authorization",
            Matcher::Exact("Bearer sk-upstream".to_string()),
            1,
        )
        .await;
    let mut config = test_config(&upstream.url());
    config.upstream.api_key = Some("sk-upstream".to_string());
    let (app, _) = build_gateway(config);

    let (status, headers, _) = send(&app, chat_request(Some("client-key"), "{}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache_header(&headers), "MISS");
    mock.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_client_credential_forwarded_without_api_key() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let mock = upstream
        .mock_chat_completion_with_header(
            "authorization",
            Matcher::Exact("Bearer client-key".to_string()),
            1,
        )
        .await;
    let (app, _) = build_gateway(test_config(&upstream.url()));

    let (status, _, _) = send(&app, chat_request(Some("client-key"), "{}")).await;

    assert_eq!(status, StatusCode::OK);
    mock.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_gateway_headers_not_forwarded() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let admin = upstream
        .mock_chat_completion_with_header("x-admin-token", Matcher::Missing, 1)
        .await;
    let mut config = test_config(&upstream.url());
    config.cache.enabled = false;
    let (app, _) = build_gateway(config.clone());

    let mut request = chat_request(Some("X"), "{}");
    request.headers_mut().insert("x-admin-token", "secret".parse().unwrap());
    request.headers_mut().insert("accept-encoding", "gzip".parse().unwrap());
    let (status, _, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    admin.assert_async().await;

    let mut upstream = UpstreamMockBuilder::new().await;
    let encoding = upstream
        .mock_chat_completion_with_header("accept-encoding", Matcher::Missing, 1)
        .await;
    config.upstream.base_url = upstream.url();
    let (app, _) = build_gateway(config);

    let mut request = chat_request(Some("X"), "{}");
    request.headers_mut().insert("accept-encoding", "gzip".parse().unwrap());
    send(&app, request).await;

    encoding.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_upstream_status_and_body_passed_through() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let mock = upstream.mock_status("POST", "/v1/chat/completions", 404, 1).await;
    let (app, _) = build_gateway(test_config(&upstream.url()));

    let (status, headers, body) = send(&app, chat_request(Some("X"), "{}")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers.get("content-type").unwrap(), "application/json");
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["message"], "upstream says no");
    mock.assert_async().await;
}
