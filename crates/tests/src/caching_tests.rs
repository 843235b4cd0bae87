//! Response caching through the full router against a mockito upstream.

use crate::mock_infrastructure::{
    build_gateway, cache_header, chat_request, send, test_config, UpstreamMockBuilder,
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use futures::future::join_all;
use serial_test::serial;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn test_cache_partitioned_by_credential() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let mock = upstream.mock_chat_completion(2).await;
    let (app, state) = build_gateway(test_config(&upstream.url()));

    let (status, headers, first) = send(&app, chat_request(Some("X"), r#"{"a":1}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache_header(&headers), "MISS");

    let (_, headers, second) = send(&app, chat_request(Some("X"), r#"{"a":1}"#)).await;
    assert_eq!(cache_header(&headers), "HIT");
    assert_eq!(first, second);

    let (_, headers, _) = send(&app, chat_request(Some("Y"), r#"{"a":1}"#)).await;
    assert_eq!(cache_header(&headers), "MISS");

    mock.assert_async().await;
    let snapshot = state.proxy_engine.stats().snapshot();
    assert_eq!(snapshot.cache_hits, 1);
    assert_eq!(snapshot.cache_stores, 2);
}

#[tokio::test]
#[serial]
async fn test_single_body_byte_changes_key() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let mock = upstream.mock_chat_completion(2).await;
    let (app, _) = build_gateway(test_config(&upstream.url()));

    send(&app, chat_request(Some("X"), r#"{"a":1}"#)).await;
    let (_, headers, _) = send(&app, chat_request(Some("X"), r#"{"a":2}"#)).await;

    assert_eq!(cache_header(&headers), "MISS");
    mock.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_streaming_requests_never_cached() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let mock = upstream.mock_event_stream(2).await;
    let (app, state) = build_gateway(test_config(&upstream.url()));

    for _ in 0..2 {
        let (status, headers, body) =
            send(&app, chat_request(Some("X"), r#"{"stream":true}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache_header(&headers), "BYPASS");
        assert_eq!(headers.get("content-type").unwrap(), "text/event-stream");
        assert!(body.starts_with(b"data:"));
    }

    mock.assert_async().await;
    assert!(state.proxy_engine.cache().is_empty());
}

#[tokio::test]
#[serial]
async fn test_event_stream_accept_header_bypasses() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let mock = upstream.mock_event_stream(2).await;
    let (app, _) = build_gateway(test_config(&upstream.url()));

    for _ in 0..2 {
        let mut request = chat_request(Some("X"), "{}");
        request.headers_mut().insert("accept", "text/event-stream".parse().unwrap());
        let (_, headers, _) = send(&app, request).await;
        assert_eq!(cache_header(&headers), "BYPASS");
    }

    mock.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_no_cache_header_refreshes_entry() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let mock = upstream.mock_chat_completion(3).await;
    let (app, state) = build_gateway(test_config(&upstream.url()));

    send(&app, chat_request(Some("X"), r#"{"a":1}"#)).await;

    let mut refresh = chat_request(Some("X"), r#"{"a":1}"#);
    refresh.headers_mut().insert("cache-control", "no-cache".parse().unwrap());
    let (_, headers, _) = send(&app, refresh).await;
    assert_eq!(cache_header(&headers), "INVALIDATED");
    assert!(state.proxy_engine.cache().is_empty());

    let (_, headers, _) = send(&app, chat_request(Some("X"), r#"{"a":1}"#)).await;
    assert_eq!(cache_header(&headers), "MISS");

    mock.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_error_responses_not_cached() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let mock = upstream.mock_status("POST", "/v1/chat/completions", 500, 2).await;
    let (app, state) = build_gateway(test_config(&upstream.url()));

    for _ in 0..2 {
        let (status, headers, _) = send(&app, chat_request(Some("X"), "{}")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(cache_header(&headers), "MISS");
    }

    mock.assert_async().await;
    assert!(state.proxy_engine.cache().is_empty());
}

#[tokio::test]
#[serial]
async fn test_get_cached_on_any_path() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let mock = upstream.mock_get("/v1/models", r#"{"data":[]}"#, 1).await;
    let (app, _) = build_gateway(test_config(&upstream.url()));

    for expected in ["MISS", "HIT"] {
        let request = Request::builder()
            .uri("/v1/models?limit=5")
            .header("authorization", "Bearer X")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache_header(&headers), expected);
        assert_eq!(&body[..], br#"{"data":[]}"#);
    }

    mock.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_post_outside_cacheable_paths_bypasses() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let mock = upstream.mock_status("POST", "/v1/files", 200, 2).await;
    let (app, _) = build_gateway(test_config(&upstream.url()));

    for _ in 0..2 {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/files")
            .header("authorization", "Bearer X")
            .body(Body::from("payload"))
            .unwrap();
        let (_, headers, _) = send(&app, request).await;
        assert_eq!(cache_header(&headers), "BYPASS");
    }

    mock.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_entries_expire_after_ttl() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let mock = upstream.mock_chat_completion(2).await;
    let mut config = test_config(&upstream.url());
    config.cache.ttl_secs = 1;
    let (app, _) = build_gateway(config);

    send(&app, chat_request(Some("X"), "{}")).await;
    let (_, headers, _) = send(&app, chat_request(Some("X"), "{}")).await;
    assert_eq!(cache_header(&headers), "HIT");

    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let (_, headers, _) = send(&app, chat_request(Some("X"), "{}")).await;
    assert_eq!(cache_header(&headers), "MISS");
    mock.assert_async().await;
}

#[tokio::test]
#[serial]
async fn test_capacity_bounds_entries() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let _mock = upstream.mock_chat_completion(5).await;
    let mut config = test_config(&upstream.url());
    config.cache.capacity = 2;
    let (app, state) = build_gateway(config);

    for i in 0..5 {
        send(&app, chat_request(Some("X"), &format!(r#"{{"n":{i}}}"#))).await;
    }

    let stats = state.proxy_engine.cache().stats();
    assert_eq!(stats.size, 2);
    assert_eq!(stats.evictions, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_identical_requests_all_succeed() {
    let mut upstream = UpstreamMockBuilder::new().await;
    let _mock = upstream.mock_chat_completion(10).await;
    let (app, state) = build_gateway(test_config(&upstream.url()));

    let results = join_all((0..10).map(|_| send(&app, chat_request(Some("X"), r#"{"a":1}"#)))).await;

    for (status, headers, _) in results {
        assert_eq!(status, StatusCode::OK);
        assert!(matches!(cache_header(&headers), "MISS" | "HIT"));
    }
    assert_eq!(state.proxy_engine.cache().len(), 1);
    assert_eq!(state.proxy_engine.stats().in_flight(), 0);
}
