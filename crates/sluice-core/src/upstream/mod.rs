//! Communication with the upstream HTTP API.
//!
//! The pipeline talks to the upstream through the [`UpstreamClient`] trait so tests can
//! substitute an in-process implementation. [`HttpClient`] is the production implementation
//! built on reqwest.
//!
//! Forwarding is single-shot: no retries, no failover. A failure is surfaced to the caller as
//! a gateway error and never cached.

pub mod errors;
pub mod http_client;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::time::Duration;

pub use errors::UpstreamError;
pub use http_client::{HttpClient, HttpClientConfig};

/// Request as sent to the upstream, after header filtering.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Path plus query string, appended to the upstream base URL.
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Fully buffered upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Forwards one request, returning the upstream response whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] when no response was obtained: timeout, connection failure,
    /// network error, invalid request, or local concurrency exhaustion.
    async fn forward(
        &self,
        request: UpstreamRequest,
        timeout: Duration,
    ) -> Result<UpstreamResponse, UpstreamError>;
}
