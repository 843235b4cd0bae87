//! # Metrics Architecture
//!
//! Two complementary paths:
//!
//! ## Hot Path (Lock-Free)
//!
//! Per-request Prometheus counters and histograms are recorded through the `metrics` facade:
//! request totals and latency by cache status, rate-limit decisions, and upstream errors by
//! type. Counter increments are atomic; nothing on this path takes a lock.
//!
//! ## State Path
//!
//! [`stats::GatewayStats`] holds the authoritative counters shared by the pipeline, cache and
//! limiter. [`MetricsCollector::record_gateway_state`] copies a snapshot of it (plus cache size
//! and tracked bucket count) into Prometheus counters and gauges, and is called right before
//! rendering the exposition text so scrapes always see current values.

pub mod stats;

use crate::{proxy::errors::ProxyError, types::CacheStatus, upstream::errors::UpstreamError};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::{sync::OnceLock, time::Duration};

use self::stats::StatsSnapshot;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub trait MetricsState {
    fn as_metric_str(&self) -> &'static str;
}

impl MetricsState for UpstreamError {
    fn as_metric_str(&self) -> &'static str {
        self.as_str()
    }
}

impl MetricsState for ProxyError {
    fn as_metric_str(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Upstream(_) => "upstream_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

fn try_init_prometheus_recorder(
) -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().install_recorder()
}

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match try_init_prometheus_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Failed to install primary Prometheus recorder, attempting fallback"
                );

                let recorder = PrometheusBuilder::new().build_recorder();
                tracing::warn!(
                    "Using fallback Prometheus recorder (install error: {e}) - metrics may not be globally visible"
                );
                recorder.handle()
            }
        })
        .clone()
}

pub struct MetricsCollector {
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    /// Creates a collector backed by the process-wide Prometheus recorder, installing it on
    /// first use.
    #[must_use]
    pub fn new() -> Self {
        Self { prometheus_handle: init_prometheus_recorder() }
    }

    /// Record a completed request
    pub fn record_request(&self, cache_status: CacheStatus, status: u16, duration: Duration) {
        let label = cache_status.as_str();
        counter!("gateway_requests_total", "cache_status" => label).increment(1);
        histogram!("gateway_request_duration_seconds", "cache_status" => label)
            .record(duration.as_secs_f64());

        if status >= 500 {
            counter!("gateway_responses_server_error_total", "cache_status" => label).increment(1);
        }
    }

    /// Record a rate limiting decision
    pub fn record_rate_limit(&self, allowed: bool) {
        if allowed {
            counter!("gateway_rate_limit_allowed_total").increment(1);
        } else {
            counter!("gateway_rate_limit_rejected_total").increment(1);
        }
    }

    /// Record an upstream failure by error type
    pub fn record_upstream_error(&self, error: &UpstreamError) {
        counter!("gateway_upstream_errors_total", "error_type" => error.as_metric_str())
            .increment(1);
    }

    /// Record a request that ended in a pipeline error
    pub fn record_proxy_error(&self, error: &ProxyError) {
        counter!("gateway_proxy_errors_total", "error_type" => error.as_metric_str()).increment(1);
    }

    /// Record upstream round-trip latency
    pub fn record_upstream_latency(&self, duration: Duration) {
        histogram!("gateway_upstream_duration_seconds").record(duration.as_secs_f64());
    }

    /// Copy gateway state into Prometheus counters and gauges
    #[allow(clippy::cast_precision_loss)]
    pub fn record_gateway_state(
        &self,
        snapshot: &StatsSnapshot,
        cache_entries: usize,
        rate_limit_buckets: usize,
    ) {
        counter!("gateway_cache_hits_total").absolute(snapshot.cache_hits);
        counter!("gateway_cache_misses_total").absolute(snapshot.cache_misses);
        counter!("gateway_cache_stores_total").absolute(snapshot.cache_stores);
        counter!("gateway_cache_evictions_total").absolute(snapshot.cache_evictions);

        gauge!("gateway_in_flight_requests").set(snapshot.in_flight as f64);
        gauge!("gateway_cache_entries").set(cache_entries as f64);
        gauge!("gateway_rate_limit_buckets").set(rate_limit_buckets as f64);
    }

    /// Get current metrics as a string (for Prometheus endpoint)
    #[must_use]
    pub fn get_prometheus_metrics(&self) -> String {
        self.prometheus_handle.render()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
