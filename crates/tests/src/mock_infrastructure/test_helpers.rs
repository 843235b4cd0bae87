//! Gateway construction and request helpers.

#![allow(clippy::expect_used)]

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use server::{create_app, AppState};
use sluice_core::{config::AppConfig, upstream::HttpClient};
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceExt;

use super::upstream_mock::CHAT_PATH;

/// Default configuration pointed at `upstream_url`, with background sweeps disabled.
#[must_use]
pub fn test_config(upstream_url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.upstream.base_url = upstream_url.to_string();
    config.upstream.timeout_secs = 5;
    config.cache.sweep_interval_secs = 0;
    config.rate_limit.cleanup_interval_secs = 0;
    config
}

/// Builds the full router over a real reqwest upstream client.
#[must_use]
pub fn build_gateway(config: AppConfig) -> (Router, AppState) {
    let upstream =
        HttpClient::with_config(config.http_client_config()).expect("valid upstream config");
    let state = AppState::from_config(config, Arc::new(upstream));
    (create_app(state.clone()), state)
}

/// Serves the gateway on an ephemeral local port with peer addresses available.
pub async fn spawn_gateway(config: AppConfig) -> (SocketAddr, AppState) {
    let (app, state) = build_gateway(config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await;
    });

    (addr, state)
}

/// `POST /v1/chat/completions` with an optional bearer credential.
#[must_use]
pub fn chat_request(credential: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(CHAT_PATH)
        .header("content-type", "application/json");
    if let Some(credential) = credential {
        builder = builder.header("authorization", format!("Bearer {credential}"));
    }
    builder.body(Body::from(body.to_string())).expect("valid request")
}

/// Sends one request through the router and buffers the response.
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.clone().oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    (status, headers, body)
}

/// The `x-cache` value of a response.
#[must_use]
pub fn cache_header(headers: &HeaderMap) -> &str {
    headers.get("x-cache").and_then(|v| v.to_str().ok()).unwrap_or("")
}
