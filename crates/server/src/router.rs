use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use http_body_util::LengthLimitError;
use serde_json::json;
use sluice_core::{
    proxy::ProxyError,
    types::{GatewayRequest, GatewayResponse, RATE_LIMIT_REMAINING_HEADER},
};
use std::net::SocketAddr;
use tracing::{error, warn};

use crate::{middleware::request_id, AppState};

/// Proxies any request not matched by a local route.
///
/// The body is buffered (bounded by `server.max_body_bytes`) and the pipeline runs in its own
/// task, so a panic inside it fails only this request with a 500.
pub async fn handle_proxy(State(state): State<AppState>, request: Request) -> Response {
    let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0.ip());
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.config.server.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            warn!(
                request_id = request_id(&parts.headers).unwrap_or_default(),
                error = %e,
                "failed to read request body"
            );
            if exceeds_length_limit(&e) {
                return (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    Json(json!({
                        "error": "request body too large",
                        "code": "PAYLOAD_TOO_LARGE"
                    })),
                )
                    .into_response();
            }
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid request body", "code": "INVALID_BODY" })),
            )
                .into_response();
        }
    };

    let gateway_request = GatewayRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(ToString::to_string),
        headers: parts.headers,
        body,
        peer,
    };

    let engine = state.proxy_engine.clone();
    let result = tokio::spawn(async move { engine.process_request(gateway_request).await })
        .await
        .unwrap_or_else(|e| Err(ProxyError::Internal(format!("pipeline task failed: {e}"))));

    match result {
        Ok(response) => gateway_response(response),
        Err(e) => error_response(&e),
    }
}

/// Bodies without a declared length are only caught while buffering; the limit error may be
/// nested under the body layer's own error.
fn exceeds_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(err) = source {
        if err.is::<LengthLimitError>() {
            return true;
        }
        source = err.source();
    }
    false
}

fn gateway_response(response: GatewayResponse) -> Response {
    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() = response.status;
    *out.headers_mut() = response.headers;
    out
}

/// Maps a pipeline failure to a JSON error body.
///
/// Rate-limit rejections carry `Retry-After` and `X-RateLimit-Remaining`.
pub fn error_response(err: &ProxyError) -> Response {
    if let ProxyError::Internal(detail) = err {
        error!(error = %detail, "internal gateway error");
    }

    let code = match err {
        ProxyError::RateLimited { .. } => "RATE_LIMIT_EXCEEDED",
        ProxyError::Upstream(e) if e.is_timeout() => "UPSTREAM_TIMEOUT",
        ProxyError::Upstream(_) => "PROXY_ERROR",
        ProxyError::Internal(_) => "INTERNAL_ERROR",
    };

    let mut response = (
        err.status_code(),
        Json(json!({ "error": err.client_message(), "code": code })),
    )
        .into_response();

    if let ProxyError::RateLimited { remaining, retry_after } = err {
        let headers = response.headers_mut();
        headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(*remaining));
        if let Some(retry_after) = retry_after {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after.as_secs()));
        }
    }

    response
}

#[allow(clippy::unused_async)]
pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let engine = &state.proxy_engine;
    let collector = engine.metrics_collector();
    collector.record_gateway_state(
        &engine.stats().snapshot(),
        engine.cache().len(),
        engine.rate_limiter().bucket_count(),
    );

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        collector.get_prometheus_metrics(),
    )
}

#[allow(clippy::unused_async)]
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "sluice",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Counters, cache occupancy and rate-limit settings. Credentials are never included.
#[allow(clippy::unused_async)]
pub async fn handle_stats(State(state): State<AppState>) -> impl IntoResponse {
    let engine = &state.proxy_engine;
    let limiter = engine.rate_limiter();
    let upstream = &state.config.upstream;

    Json(json!({
        "gateway": engine.stats().snapshot(),
        "cache": engine.cache().stats(),
        "rate_limit": {
            "max_tokens": limiter.max_tokens(),
            "refill_per_second": limiter.refill_rate(),
            "tracked_clients": limiter.bucket_count(),
        },
        "upstream": {
            "base_url": upstream.base_url,
            "timeout_secs": upstream.timeout_secs,
            "proxy_configured": upstream.proxy_url.is_some(),
            "api_key_configured": upstream.api_key.is_some(),
        },
    }))
}
