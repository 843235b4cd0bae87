use crate::metrics::stats::GatewayStats;
use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Whole tokens left in the bucket after the decision.
    pub remaining: u64,
    /// Time until the requested tokens will be available. `None` when admitted, when the bucket
    /// never refills, or when the request can never fit.
    pub retry_after: Option<Duration>,
}

/// Rate limiter using token bucket algorithm.
///
/// Buckets refill lazily on access, so no timer is needed for correctness. Refill, check and
/// subtract happen while holding the bucket's shard guard, so two concurrent requests from one
/// client never both spend the last token.
///
/// **Security**: Limits maximum tracked clients to prevent OOM from spoofed addresses.
pub struct RateLimiter {
    buckets: Arc<DashMap<String, TokenBucket>>,
    max_tokens: u32,
    refill_rate: f64,
    cleanup_interval: Duration,
    bucket_ttl: Duration,
    max_buckets: usize,
    stats: Arc<GatewayStats>,
}

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_access: Instant,
}

impl RateLimiter {
    pub const DEFAULT_MAX_BUCKETS: usize = 100_000;

    /// Creates a limiter allowing bursts of `max_tokens`, refilling `refill_rate` tokens per
    /// second. A zero refill rate is a fixed quota; zero `max_tokens` rejects everything.
    #[must_use]
    pub fn new(max_tokens: u32, refill_rate: f64, stats: Arc<GatewayStats>) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            max_tokens,
            refill_rate: refill_rate.max(0.0),
            cleanup_interval: Duration::from_secs(300),
            bucket_ttl: Duration::from_secs(300),
            max_buckets: Self::DEFAULT_MAX_BUCKETS,
            stats,
        }
    }

    #[must_use]
    pub fn with_max_buckets(mut self, max_buckets: usize) -> Self {
        self.max_buckets = max_buckets;
        self
    }

    #[must_use]
    pub fn with_bucket_ttl(mut self, bucket_ttl: Duration) -> Self {
        self.bucket_ttl = bucket_ttl;
        self
    }

    #[must_use]
    pub fn with_cleanup_interval(mut self, cleanup_interval: Duration) -> Self {
        self.cleanup_interval = cleanup_interval;
        self
    }

    #[must_use]
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    #[must_use]
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Spawns the idle-bucket sweep, stopping on shutdown.
    pub fn start_cleanup_task(
        self: &Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Option<JoinHandle<()>> {
        if self.cleanup_interval.is_zero() {
            return None;
        }

        let limiter = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.cleanup_interval);

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.recv() => {
                        debug!("rate limiter sweep received shutdown signal");
                        break;
                    }

                    _ = interval.tick() => {
                        let removed = limiter.cleanup_idle_buckets();
                        if removed > 0 {
                            debug!(removed, remaining = limiter.bucket_count(), "swept idle rate limit buckets");
                        }
                    }
                }
            }

            info!("rate limiter sweep shutdown complete");
        }))
    }

    /// Spends `n` tokens from `client_id`'s bucket if available. Never blocks.
    ///
    /// New clients are rejected when `max_buckets` are tracked and an idle sweep frees nothing.
    pub fn try_consume(&self, client_id: &str, n: u32) -> Admission {
        let now = Instant::now();

        if let Some(mut bucket) = self.buckets.get_mut(client_id) {
            let admission = self.process_bucket(&mut bucket, now, n);
            drop(bucket);
            return self.record(client_id, admission);
        }

        if self.buckets.len() >= self.max_buckets {
            let swept = self.cleanup_idle_buckets();
            if self.buckets.len() >= self.max_buckets {
                warn!(
                    client_id = %client_id,
                    tracked = self.buckets.len(),
                    swept,
                    "rate limiter at bucket capacity, rejecting new client"
                );
                let admission = Admission { allowed: false, remaining: 0, retry_after: None };
                return self.record(client_id, admission);
            }
        }

        let mut bucket = self.buckets.entry(client_id.to_string()).or_insert_with(|| TokenBucket {
            tokens: f64::from(self.max_tokens),
            last_refill: now,
            last_access: now,
        });

        let admission = self.process_bucket(&mut bucket, now, n);
        drop(bucket);
        self.record(client_id, admission)
    }

    fn process_bucket(&self, bucket: &mut TokenBucket, now: Instant, n: u32) -> Admission {
        let max = f64::from(self.max_tokens);
        let wanted = f64::from(n);

        bucket.last_access = now;

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.refill_rate).min(max);
        bucket.last_refill = now;

        if bucket.tokens >= wanted {
            bucket.tokens -= wanted;
            return Admission {
                allowed: true,
                remaining: whole_tokens(bucket.tokens),
                retry_after: None,
            };
        }

        let retry_after = if self.refill_rate > 0.0 && wanted <= max {
            let secs = ((wanted - bucket.tokens) / self.refill_rate).ceil().max(1.0);
            Duration::try_from_secs_f64(secs).ok()
        } else {
            None
        };

        Admission { allowed: false, remaining: whole_tokens(bucket.tokens), retry_after }
    }

    fn record(&self, client_id: &str, admission: Admission) -> Admission {
        if admission.allowed {
            self.stats.record_admitted();
        } else {
            self.stats.record_rejected();
            debug!(client_id = %client_id, remaining = admission.remaining, "rate limit exceeded");
        }
        admission
    }

    /// Removes buckets idle for longer than the bucket TTL. Returns the number removed.
    pub fn cleanup_idle_buckets(&self) -> usize {
        let now = Instant::now();
        let before_count = self.buckets.len();

        self.buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_access) < self.bucket_ttl);

        before_count.saturating_sub(self.buckets.len())
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[doc(hidden)]
    #[must_use]
    pub fn get_bucket_info(&self, client_id: &str) -> Option<(f64, Instant)> {
        self.buckets.get(client_id).map(|bucket| (bucket.tokens, bucket.last_access))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_tokens(tokens: f64) -> u64 {
    tokens.max(0.0).floor() as u64
}
