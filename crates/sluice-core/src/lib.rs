//! # Sluice Core
//!
//! Core library for Sluice, a caching, rate-limited reverse proxy for HTTP APIs.
//!
//! This crate provides:
//!
//! - **[`cache`]**: bounded LRU response cache with per-entry TTL, cache key derivation and the
//!   cacheability policy.
//!
//! - **[`middleware`]**: client identification and per-client token bucket rate limiting.
//!
//! - **[`proxy`]**: the request pipeline tying admission, caching and forwarding together.
//!
//! - **[`upstream`]**: the upstream client trait and its reqwest implementation.
//!
//! - **[`metrics`]**: shared gateway counters and Prometheus export.
//!
//! - **[`config`]**: layered application configuration.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        ProxyEngine                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ RateLimiter  │  │ResponseCache │  │ UpstreamClient  │  │
//! │  └──────┬───────┘  └──────┬───────┘  └────────┬────────┘  │
//! │         │                 │                   │           │
//! │         └────────┬────────┴───────────────────┘           │
//! │                  ▼                                        │
//! │           ┌──────────────┐       ┌──────────────────┐     │
//! │           │ GatewayStats │ ────► │ MetricsCollector │     │
//! │           └──────────────┘       └──────────────────┘     │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! The HTTP front end lives in the `server` crate; this crate has no listener of its own.

pub mod cache;
pub mod config;
pub mod metrics;
pub mod middleware;
pub mod proxy;
pub mod types;
pub mod upstream;
