//! In-memory response cache with TTL expiry and LRU eviction.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      ResponseCache                       │
//! │   get / set / delete / clear / stats / purge_expired     │
//! └────────────────────────────┬─────────────────────────────┘
//!                              │ parking_lot::Mutex
//!               ┌──────────────▼──────────────┐
//!               │   LruStore<CacheKey, ...>   │
//!               │  • key -> arena index map   │
//!               │  • index-linked recency list│
//!               │  • per-entry expiry         │
//!               └─────────────────────────────┘
//! ```
//!
//! The map and the recency list are mutated together under a single lock, and no operation
//! holding the lock awaits. Expiry is checked lazily on access; [`ResponseCache::purge_expired`]
//! (driven by [`ResponseCache::start_cleanup_task`]) only reclaims memory and never changes what
//! `get` returns.
//!
//! # Submodules
//!
//! - [`key`]: cache key derivation from request fingerprints
//! - [`policy`]: what may be looked up and what may be stored
//! - [`lru`]: the arena-backed store

pub mod key;
pub mod lru;
pub mod policy;

use crate::metrics::stats::GatewayStats;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tracing::{debug, info};

const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

pub use key::{CacheKey, CredentialScope, KeyDeriver, RequestFingerprint};
pub use lru::{InsertOutcome, LruStore};
pub use policy::{BypassReason, CacheDisposition, CachePolicy};

/// Stored upstream response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
}

impl CachedResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self { status, headers, body, stored_at: Utc::now() }
    }
}

/// Cache statistics. Everything except `size` only ever grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
}

/// Thread-safe TTL + LRU response cache.
///
/// Hit, miss, store and eviction counts are recorded in the injected [`GatewayStats`].
pub struct ResponseCache {
    store: Mutex<LruStore<CacheKey, Arc<CachedResponse>>>,
    default_ttl: Duration,
    stats: Arc<GatewayStats>,
}

impl ResponseCache {
    #[must_use]
    pub fn new(capacity: usize, default_ttl: Duration, stats: Arc<GatewayStats>) -> Self {
        Self { store: Mutex::new(LruStore::new(capacity)), default_ttl, stats }
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.store.lock().capacity()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// Returns the live entry for `key`, promoting it to most recently used.
    ///
    /// Expired entries are purged on the spot and reported as a miss.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<CachedResponse>> {
        let now = Instant::now();
        let found = self.store.lock().get(key, now).cloned();

        if found.is_some() {
            self.stats.record_cache_hit();
        } else {
            self.stats.record_cache_miss();
        }
        found
    }

    /// Inserts or fully overwrites `key` with `ttl_override` or the default TTL.
    ///
    /// A zero-capacity cache stores nothing. A zero TTL stores nothing and drops any existing
    /// entry for `key`. TTLs past the clock's range are capped at roughly thirty years.
    pub fn set(&self, key: CacheKey, value: CachedResponse, ttl_override: Option<Duration>) {
        let ttl = ttl_override.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            self.store.lock().remove(key.as_str());
            return;
        }

        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE);
        let outcome = self.store.lock().insert(key, Arc::new(value), expires_at);

        match outcome {
            InsertOutcome::Rejected => {}
            InsertOutcome::Evicted => {
                self.stats.record_cache_store();
                self.stats.record_cache_evictions(1);
            }
            InsertOutcome::Inserted | InsertOutcome::Replaced => self.stats.record_cache_store(),
        }
    }

    /// Removes `key`. Returns `true` if an entry existed, expired or not.
    pub fn delete(&self, key: &str) -> bool {
        self.store.lock().remove(key)
    }

    pub fn clear(&self) {
        self.store.lock().clear();
        info!("response cache cleared");
    }

    /// Reclaims expired entries. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let removed = self.store.lock().purge_expired(Instant::now());
        if removed > 0 {
            debug!(removed, "purged expired cache entries");
        }
        removed
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let (size, capacity) = {
            let store = self.store.lock();
            (store.len(), store.capacity())
        };
        let snapshot = self.stats.snapshot();

        CacheStats {
            size,
            capacity,
            ttl_secs: self.default_ttl.as_secs(),
            hits: snapshot.cache_hits,
            misses: snapshot.cache_misses,
            stores: snapshot.cache_stores,
            evictions: snapshot.cache_evictions,
        }
    }

    /// Spawns the periodic expiry sweep. Returns `None` when `interval` is zero.
    pub fn start_cleanup_task(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            return None;
        }

        let cache = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.recv() => {
                        debug!("cache sweep received shutdown signal");
                        break;
                    }

                    _ = ticker.tick() => {
                        cache.purge_expired();
                    }
                }
            }

            info!("cache sweep shutdown complete");
        }))
    }
}
