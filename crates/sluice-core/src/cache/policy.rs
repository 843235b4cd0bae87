//! Decides whether a request may use the cache and whether a response may be stored.

use crate::{cache::key::is_idempotent_read, types::GatewayRequest};
use http::{header, HeaderMap, Method, StatusCode};

/// What the pipeline should do with the cache for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDisposition {
    /// Look the key up; on a miss, store a qualifying response.
    Lookup,
    /// Skip the cache entirely.
    Bypass(BypassReason),
    /// Drop any existing entry for the key, forward, and do not store.
    Invalidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    Disabled,
    Streaming,
    NotCacheable,
}

impl BypassReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            BypassReason::Disabled => "disabled",
            BypassReason::Streaming => "streaming",
            BypassReason::NotCacheable => "not_cacheable",
        }
    }
}

/// Caching rules derived from configuration.
///
/// Methods in `cacheable_methods` that are idempotent reads (GET, HEAD, OPTIONS) are cacheable on
/// any path. Other allowed methods (typically POST) are cacheable only on `cacheable_paths`.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub enabled: bool,
    pub success_only: bool,
    pub cacheable_methods: Vec<Method>,
    pub cacheable_paths: Vec<String>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            success_only: true,
            cacheable_methods: vec![Method::GET, Method::POST],
            cacheable_paths: vec![
                "/v1/chat/completions".to_string(),
                "/v1/completions".to_string(),
                "/v1/embeddings".to_string(),
            ],
        }
    }
}

impl CachePolicy {
    /// Classifies a request.
    ///
    /// An invalidation signal takes precedence over streaming, so a streaming request that also
    /// asks for fresh data still clears the stale entry (once) and is labelled invalidated.
    #[must_use]
    pub fn classify(&self, request: &GatewayRequest) -> CacheDisposition {
        if !self.enabled {
            return CacheDisposition::Bypass(BypassReason::Disabled);
        }
        if has_invalidation_signal(&request.headers) {
            return CacheDisposition::Invalidate;
        }
        if is_streaming_request(request) {
            return CacheDisposition::Bypass(BypassReason::Streaming);
        }
        if !self.is_cacheable_request(&request.method, &request.path) {
            return CacheDisposition::Bypass(BypassReason::NotCacheable);
        }
        CacheDisposition::Lookup
    }

    #[must_use]
    pub fn is_cacheable_request(&self, method: &Method, path: &str) -> bool {
        if !self.cacheable_methods.contains(method) {
            return false;
        }
        is_idempotent_read(method) || self.cacheable_paths.iter().any(|p| p == path)
    }

    /// Whether an upstream response may be stored.
    ///
    /// Server errors are never stored. With `success_only`, only 2xx is. Event streams and
    /// responses marked `Cache-Control: no-store` are never stored.
    #[must_use]
    pub fn is_storable_response(&self, status: StatusCode, headers: &HeaderMap) -> bool {
        let status_ok = if self.success_only {
            status.is_success()
        } else {
            !status.is_server_error()
        };

        status_ok && !is_event_stream(headers) && !has_directive(headers, header::CACHE_CONTROL, "no-store")
    }
}

/// `Cache-Control: no-cache`/`no-store` or `Pragma: no-cache`.
#[must_use]
pub fn has_invalidation_signal(headers: &HeaderMap) -> bool {
    has_directive(headers, header::CACHE_CONTROL, "no-cache")
        || has_directive(headers, header::CACHE_CONTROL, "no-store")
        || has_directive(headers, header::PRAGMA, "no-cache")
}

/// A truthy `stream` field in a JSON object body, or `Accept: text/event-stream`.
///
/// Bodies that are not JSON objects are simply not streaming.
#[must_use]
pub fn is_streaming_request(request: &GatewayRequest) -> bool {
    if accepts_event_stream(&request.headers) {
        return true;
    }

    let trimmed = request.body.trim_ascii_start();
    if !trimmed.starts_with(b"{") {
        return false;
    }

    match serde_json::from_slice::<serde_json::Value>(trimmed) {
        Ok(value) => value.get("stream").is_some_and(is_truthy),
        Err(_) => false,
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => s.eq_ignore_ascii_case("true"),
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|media| media.trim().to_ascii_lowercase().starts_with("text/event-stream"))
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().to_ascii_lowercase().starts_with("text/event-stream"))
}

fn has_directive(headers: &HeaderMap, name: header::HeaderName, directive: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|d| d.trim().eq_ignore_ascii_case(directive))
}
