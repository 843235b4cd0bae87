//! Request correlation ids.
//!
//! Every request gets an `x-request-id` (kept when the client sent one, otherwise a UUID v4),
//! which is echoed on the response and attached to the request's tracing span.

use axum::{
    body::Body,
    http::{header::HeaderValue, HeaderMap, HeaderName, Request},
};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tracing::Span;
use uuid::Uuid;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates UUID v4 request ids for tower-http's request id middleware.
#[derive(Clone, Copy, Default)]
pub struct UuidRequestIdGenerator;

impl MakeRequestId for UuidRequestIdGenerator {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        Some(RequestId::new(HeaderValue::from_str(&id).ok()?))
    }
}

/// Returns the `(set, propagate)` layer pair. Apply `propagate` first so `set` runs outermost.
pub fn create_request_id_layers(
) -> (SetRequestIdLayer<UuidRequestIdGenerator>, PropagateRequestIdLayer) {
    (
        SetRequestIdLayer::new(X_REQUEST_ID.clone(), UuidRequestIdGenerator),
        PropagateRequestIdLayer::new(X_REQUEST_ID.clone()),
    )
}

/// The request's correlation id, if set and valid UTF-8.
#[must_use]
pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(&X_REQUEST_ID).and_then(|v| v.to_str().ok())
}

/// Span for `TraceLayer` carrying method, path and correlation id.
pub fn make_request_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = request_id(request.headers()).unwrap_or_default(),
    )
}
