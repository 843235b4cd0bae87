//! Token bucket admission through the full router.

use crate::mock_infrastructure::{
    build_gateway, chat_request, send, spawn_gateway, test_config, UpstreamMockBuilder, CHAT_PATH,
};
use axum::http::StatusCode;
use serial_test::serial;

#[tokio::test]
#[serial]
async fn test_sixty_first_request_rejected() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let mock = upstream.mock_chat_completion(1).await;
    let mut config = test_config(&upstream.url());
    config.rate_limit.refill_per_second = 0.01;
    let (app, state) = build_gateway(config);

    for i in 0..60 {
        let (status, _, _) = send(&app, chat_request(Some("X"), "{}")).await;
        assert_eq!(status, StatusCode::OK, "request {i} should be admitted");
    }

    let (status, headers, body) = send(&app, chat_request(Some("X"), "{}")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "0");
    assert!(headers.get("retry-after").is_some());

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "RATE_LIMIT_EXCEEDED");

    mock.assert_async().await;
    let snapshot = state.proxy_engine.stats().snapshot();
    assert_eq!(snapshot.admitted, 60);
    assert_eq!(snapshot.rejected, 1);
}

#[tokio::test]
#[serial]
async fn test_rejected_requests_never_reach_upstream() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let mock = upstream.mock_chat_completion(1).await;
    let mut config = test_config(&upstream.url());
    config.rate_limit.max_tokens = 1;
    config.rate_limit.refill_per_second = 0.01;
    config.cache.enabled = false;
    let (app, _) = build_gateway(config);

    let (first, _, _) = send(&app, chat_request(Some("X"), "{}")).await;
    let (second, _, _) = send(&app, chat_request(Some("X"), "{}")).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    mock.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_credentials_have_independent_buckets() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let _mock = upstream.mock_chat_completion(2).await;
    let mut config = test_config(&upstream.url());
    config.rate_limit.max_tokens = 1;
    config.rate_limit.refill_per_second = 0.01;
    let (app, state) = build_gateway(config);

    let (a, _, _) = send(&app, chat_request(Some("A"), "{}")).await;
    let (b, _, _) = send(&app, chat_request(Some("B"), "{}")).await;
    let (a_again, _, _) = send(&app, chat_request(Some("A"), "{}")).await;

    assert_eq!(a, StatusCode::OK);
    assert_eq!(b, StatusCode::OK);
    assert_eq!(a_again, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(state.proxy_engine.rate_limiter().bucket_count(), 2);
}

#[tokio::test]
#[serial]
async fn test_forwarded_for_identifies_anonymous_clients() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let _mock = upstream.mock_chat_completion(2).await;
    let mut config = test_config(&upstream.url());
    config.rate_limit.max_tokens = 1;
    config.rate_limit.refill_per_second = 0.01;
    let (app, _) = build_gateway(config);

    let from = |ip: &str| {
        let mut request = chat_request(None, "{}");
        request.headers_mut().insert("x-forwarded-for", ip.parse().unwrap());
        request
    };

    let (first, _, _) = send(&app, from("203.0.113.7, 10.0.0.1")).await;
    let (other, _, _) = send(&app, from("198.51.100.2")).await;
    let (repeat, _, _) = send(&app, from("203.0.113.7")).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(other, StatusCode::OK);
    assert_eq!(repeat, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
#[serial]
async fn test_anonymous_clients_limited_by_peer_address() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let mock = upstream.mock_chat_completion(1).await;
    let mut config = test_config(&upstream.url());
    config.rate_limit.max_tokens = 1;
    config.rate_limit.refill_per_second = 0.01;
    let (addr, state) = spawn_gateway(config).await;

    let client = reqwest::Client::new();
    let url = format!("http://{addr}{CHAT_PATH}");

    let first = client.post(&url).body("{}").send().await.unwrap();
    let second = client.post(&url).body("{}").send().await.unwrap();

    assert_eq!(first.status(), reqwest::StatusCode::OK);
    assert_eq!(second.status(), reqwest::StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.headers().get("x-ratelimit-remaining").unwrap(), "0");

    mock.assert_async().await;
    assert_eq!(state.proxy_engine.rate_limiter().bucket_count(), 1);
}
