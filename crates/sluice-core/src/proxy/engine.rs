use std::{sync::Arc, time::Duration};

use http::{HeaderMap, HeaderValue};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    cache::{
        BypassReason, CacheDisposition, CacheKey, CachePolicy, CachedResponse, KeyDeriver,
        ResponseCache,
    },
    metrics::{stats::GatewayStats, MetricsCollector},
    middleware::{client_id, RateLimiter},
    types::{CacheStatus, GatewayRequest, GatewayResponse, CACHE_STATUS_HEADER},
    upstream::{UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse},
};

use super::{
    errors::ProxyError,
    headers::{client_response_headers, upstream_request_headers},
};

/// Response header carrying the time a cached response was stored (RFC 3339).
pub const CACHE_TIMESTAMP_HEADER: &str = "x-cache-timestamp";

/// Shared context for the pipeline.
///
/// Groups the long-lived collaborators so the engine (and the server's admin handlers) hold one
/// `Arc` instead of five.
#[derive(Clone)]
pub struct SharedContext {
    pub cache: Arc<ResponseCache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub upstream: Arc<dyn UpstreamClient>,
    pub metrics_collector: Arc<MetricsCollector>,
    pub stats: Arc<GatewayStats>,
}

/// Per-request behavior of the pipeline.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub policy: CachePolicy,
    pub key_deriver: KeyDeriver,
    pub upstream_timeout: Duration,
    /// Credential sent upstream in place of the client's, when set.
    pub upstream_api_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: CachePolicy::default(),
            key_deriver: KeyDeriver::default(),
            upstream_timeout: Duration::from_secs(30),
            upstream_api_key: None,
        }
    }
}

/// Core proxy engine.
///
/// ```text
/// RECEIVED ─► identify + admit ──rejected──► 429
///                  │
///                  ▼
///            classify request ──bypass / invalidate──┐
///                  │ lookup                          │
///                  ▼                                 │
///             cache get ──hit──► HIT                 │
///                  │ miss                            │
///                  ▼                                 ▼
///             forward upstream (timeout, no retries) ──failed──► 502 / 504
///                  │
///                  ▼
///        store if policy allows (miss only) ──► MISS / BYPASS / INVALIDATED
/// ```
///
/// Thread-safe; shared across request tasks behind an `Arc`.
pub struct ProxyEngine {
    ctx: Arc<SharedContext>,
    config: EngineConfig,
}

impl ProxyEngine {
    #[must_use]
    pub fn new(ctx: SharedContext, config: EngineConfig) -> Self {
        Self { ctx: Arc::new(ctx), config }
    }

    /// Runs one request through the pipeline.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::RateLimited`] when the client's bucket is exhausted
    /// - [`ProxyError::Upstream`] when the upstream call times out or fails
    pub async fn process_request(
        &self,
        request: GatewayRequest,
    ) -> Result<GatewayResponse, ProxyError> {
        let started = Instant::now();
        let _in_flight = self.ctx.stats.track_in_flight();

        let client = client_id::identify(&request.headers, request.peer);
        let admission = self.ctx.rate_limiter.try_consume(&client, 1);
        self.ctx.metrics_collector.record_rate_limit(admission.allowed);

        if !admission.allowed {
            warn!(
                client_id = %client,
                method = %request.method,
                path = %request.path,
                remaining = admission.remaining,
                "request rejected by rate limiter"
            );
            let err = ProxyError::RateLimited {
                remaining: admission.remaining,
                retry_after: admission.retry_after,
            };
            self.ctx.metrics_collector.record_proxy_error(&err);
            return Err(err);
        }

        let (store_key, cache_status) = match self.config.policy.classify(&request) {
            CacheDisposition::Lookup => {
                let key = self.config.key_deriver.derive_key(&request);

                if let Some(cached) = self.ctx.cache.get(key.as_str()) {
                    debug!(method = %request.method, path = %request.path, key = %key, "cache hit");
                    let response = Self::cached_response(&cached);
                    self.ctx.metrics_collector.record_request(
                        CacheStatus::Hit,
                        response.status.as_u16(),
                        started.elapsed(),
                    );
                    return Ok(response);
                }

                debug!(method = %request.method, path = %request.path, key = %key, "cache miss");
                (Some(key), CacheStatus::Miss)
            }
            CacheDisposition::Invalidate => {
                let key = self.config.key_deriver.derive_key(&request);
                let existed = self.ctx.cache.delete(key.as_str());
                debug!(path = %request.path, key = %key, existed, "cache entry invalidated by client");
                (None, CacheStatus::Invalidated)
            }
            CacheDisposition::Bypass(reason) => {
                Self::log_bypass(&request, reason);
                (None, CacheStatus::Bypass)
            }
        };

        let upstream_response = self.forward(&request).await.inspect_err(|err| {
            self.ctx.metrics_collector.record_proxy_error(err);
        })?;

        if let Some(key) = store_key {
            self.maybe_store(key, &upstream_response);
        }

        let mut headers = client_response_headers(&upstream_response.headers);
        headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static(cache_status.as_str()));

        self.ctx.metrics_collector.record_request(
            cache_status,
            upstream_response.status.as_u16(),
            started.elapsed(),
        );

        Ok(GatewayResponse {
            status: upstream_response.status,
            headers,
            body: upstream_response.body,
            cache_status,
        })
    }

    /// Sends the request upstream exactly once, bounded by the configured timeout.
    ///
    /// On timeout the in-flight call is dropped, so a late response is never stored or returned.
    async fn forward(&self, request: &GatewayRequest) -> Result<UpstreamResponse, ProxyError> {
        let timeout = self.config.upstream_timeout;
        let upstream_request = UpstreamRequest {
            method: request.method.clone(),
            path_and_query: request.path_and_query(),
            headers: upstream_request_headers(
                &request.headers,
                self.config.upstream_api_key.as_deref(),
            ),
            body: request.body.clone(),
        };

        let started = Instant::now();
        let result =
            match tokio::time::timeout(timeout, self.ctx.upstream.forward(upstream_request, timeout))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(UpstreamError::Timeout),
            };
        self.ctx.metrics_collector.record_upstream_latency(started.elapsed());

        result.map_err(|e| {
            self.ctx.stats.record_upstream_error();
            self.ctx.metrics_collector.record_upstream_error(&e);
            warn!(
                method = %request.method,
                path = %request.path,
                error = %e,
                timeout_ms = timeout.as_millis(),
                "upstream request failed"
            );
            ProxyError::Upstream(e)
        })
    }

    fn maybe_store(&self, key: CacheKey, response: &UpstreamResponse) {
        if !self.config.policy.is_storable_response(response.status, &response.headers) {
            debug!(status = response.status.as_u16(), key = %key, "response not cacheable");
            return;
        }

        let entry = CachedResponse::new(
            response.status,
            client_response_headers(&response.headers),
            response.body.clone(),
        );
        self.ctx.cache.set(key, entry, None);
    }

    fn cached_response(cached: &CachedResponse) -> GatewayResponse {
        let mut headers: HeaderMap = cached.headers.clone();
        headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static(CacheStatus::Hit.as_str()));
        if let Ok(stored_at) = HeaderValue::from_str(&cached.stored_at.to_rfc3339()) {
            headers.insert(CACHE_TIMESTAMP_HEADER, stored_at);
        }

        GatewayResponse {
            status: cached.status,
            headers,
            body: cached.body.clone(),
            cache_status: CacheStatus::Hit,
        }
    }

    fn log_bypass(request: &GatewayRequest, reason: BypassReason) {
        debug!(
            method = %request.method,
            path = %request.path,
            reason = reason.as_str(),
            "cache bypassed"
        );
    }

    #[must_use]
    pub fn context(&self) -> &Arc<SharedContext> {
        &self.ctx
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.ctx.cache
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.ctx.rate_limiter
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<GatewayStats> {
        &self.ctx.stats
    }

    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        &self.ctx.metrics_collector
    }
}
