//! HTTP front end for the Sluice gateway.
//!
//! Wires the `sluice_core` pipeline into an axum [`Router`]: every unmatched route is proxied,
//! with `/health`, `/metrics`, `/stats` and the admin cache routes served locally.

pub mod admin;
pub mod middleware;
pub mod router;

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{routing::get, Router};
use sluice_core::{
    cache::ResponseCache,
    config::AppConfig,
    metrics::{stats::GatewayStats, MetricsCollector},
    middleware::RateLimiter,
    proxy::{ProxyEngine, SharedContext},
    upstream::UpstreamClient,
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub proxy_engine: Arc<ProxyEngine>,
    pub config: Arc<AppConfig>,
    pub start_time: Instant,
}

impl AppState {
    /// Builds the cache, limiter, metrics and pipeline described by `config`.
    ///
    /// One [`GatewayStats`] instance is shared by all of them, so counters start at zero on
    /// every process start.
    #[must_use]
    pub fn from_config(config: AppConfig, upstream: Arc<dyn UpstreamClient>) -> Self {
        let stats = GatewayStats::shared();

        let cache =
            Arc::new(ResponseCache::new(config.cache.capacity, config.cache_ttl(), stats.clone()));

        let rate_limiter = Arc::new(
            RateLimiter::new(
                config.rate_limit.max_tokens,
                config.rate_limit.refill_per_second,
                stats.clone(),
            )
            .with_max_buckets(config.rate_limit.max_buckets)
            .with_bucket_ttl(Duration::from_secs(config.rate_limit.idle_ttl_secs))
            .with_cleanup_interval(Duration::from_secs(config.rate_limit.cleanup_interval_secs)),
        );

        let ctx = SharedContext {
            cache,
            rate_limiter,
            upstream,
            metrics_collector: Arc::new(MetricsCollector::new()),
            stats,
        };
        let proxy_engine = Arc::new(ProxyEngine::new(ctx, config.engine_config()));

        Self { proxy_engine, config: Arc::new(config), start_time: Instant::now() }
    }
}

/// Assembles the full application router.
///
/// Body and concurrency limits apply to proxied traffic only; request ids and tracing apply
/// to every route.
pub fn create_app(state: AppState) -> Router {
    let max_body_bytes = state.config.server.max_body_bytes;
    let max_concurrent = state.config.server.max_concurrent_requests;

    let public = Router::new()
        .route("/health", get(router::handle_health))
        .route("/metrics", get(router::handle_metrics))
        .route("/stats", get(router::handle_stats))
        .with_state(state.clone());

    let proxied = Router::new()
        .fallback(router::handle_proxy)
        .with_state(state.clone())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(ConcurrencyLimitLayer::new(max_concurrent));

    let mut app = public.merge(proxied);
    if state.config.admin.enabled {
        app = app.merge(admin::create_admin_router(state));
    }

    // Layers run outside-in, so the id is set before it is propagated or traced.
    let (set_request_id, propagate_request_id) = middleware::create_request_id_layers();
    app.layer(TraceLayer::new_for_http().make_span_with(middleware::make_request_span))
        .layer(propagate_request_id)
        .layer(set_request_id)
}

#[cfg(test)]
pub(crate) mod test_support;
