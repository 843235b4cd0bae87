//! Admission-side request processing: who is calling, and may they proceed.
//!
//! HTTP adapters (axum extractors and responses) live in `crates/server`; this module holds the
//! transport-independent logic so it can be tested without HTTP machinery.
//!
//! ```text
//!   Incoming Request
//!        │
//!        ▼
//!   ┌─────────────────────────┐
//!   │  1. IDENTIFY            │  client_id::identify()
//!   │     - credential digest │  - Bearer / x-api-key
//!   │     - forwarded address │  - X-Forwarded-For / X-Real-IP / peer
//!   └─────────────────────────┘
//!        │
//!        ▼
//!   ┌─────────────────────────┐
//!   │  2. ADMIT               │  RateLimiter::try_consume()
//!   │     - lazy refill       │  - per-client token bucket
//!   │     - atomic spend      │  - bounded bucket map
//!   └─────────────────────────┘
//!        │ rejected?
//!        ├─> 429 Too Many Requests (Retry-After, x-ratelimit-remaining)
//!        │
//!        ▼
//!   Cache lookup / upstream forwarding (see `proxy`)
//! ```
//!
//! # Refill Logic
//!
//! ```rust,ignore
//! elapsed_seconds = now - last_refill
//! tokens = min(tokens + elapsed_seconds * refill_rate, max_tokens)
//! ```
//!
//! This allows bursts up to `max_tokens` while enforcing a sustained rate of `refill_rate`
//! requests per second.

pub mod client_id;
pub mod rate_limiting;

pub use client_id::identify;
pub use rate_limiting::{Admission, RateLimiter};
