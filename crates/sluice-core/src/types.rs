//! Core type definitions shared by the pipeline and the HTTP surface.
//!
//! - [`GatewayRequest`]: transport-independent view of an inbound request
//! - [`GatewayResponse`]: what the pipeline hands back to the server layer
//! - [`CacheStatus`]: cache outcome, rendered in the `x-cache` response header

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Response header carrying the [`CacheStatus`] label.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Response header carrying the remaining token count on rate-limited responses.
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// How the cache participated in producing a response.
///
/// # Example
///
/// ```
/// use sluice_core::types::CacheStatus;
///
/// assert_eq!(CacheStatus::Hit.to_string(), "HIT");
/// assert_eq!(CacheStatus::Invalidated.as_str(), "INVALIDATED");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStatus {
    /// Served from the cache without contacting the upstream.
    Hit,
    /// Looked up, not found, forwarded to the upstream.
    Miss,
    /// Cache skipped entirely: streaming request or caching disabled.
    Bypass,
    /// Client asked for fresh data; any existing entry was dropped and the response forwarded.
    Invalidated,
}

impl CacheStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
            CacheStatus::Invalidated => "INVALIDATED",
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound request as seen by the pipeline.
///
/// The server layer builds one of these from the axum request after buffering the body; the
/// pipeline never touches the transport directly.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    /// Request path without the query string, e.g. `/v1/chat/completions`.
    pub path: String,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Transport peer address, when known.
    pub peer: Option<IpAddr>,
}

impl GatewayRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            peer: None,
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = value.parse() {
            self.headers.insert(name, value);
        }
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_peer(mut self, peer: IpAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Path plus query string, as forwarded upstream.
    #[must_use]
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) if !query.is_empty() => format!("{}?{}", self.path, query),
            _ => self.path.clone(),
        }
    }
}

/// Response produced by the pipeline, ready to be written by the server layer.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub cache_status: CacheStatus,
}
