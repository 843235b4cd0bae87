//! Request pipeline: admission, cache decision, forwarding and storage.
//!
//! # Main Components
//!
//! - `ProxyEngine`: runs one request through the pipeline
//! - `ProxyError`: terminal failures and their HTTP status mapping
//! - `headers`: hop-by-hop filtering and upstream credential substitution
//!
//! # Request Processing Flow
//!
//! ```text
//! GatewayRequest
//!       │
//!       ▼
//! ┌──────────────┐
//! │ RateLimiter  │ ─── empty bucket ──► ProxyError::RateLimited (429)
//! └──────┬───────┘
//!        │ admitted
//!        ▼
//! ┌──────────────┐
//! │ CachePolicy  │ ─── Bypass / Invalidate ──────────┐
//! └──────┬───────┘                                   │
//!        │ Lookup                                    │
//!        ▼                                           │
//! ┌──────────────┐                                   │
//! │ResponseCache │ ─── hit ──► x-cache: HIT          │
//! └──────┬───────┘                                   │
//!        │ miss                                      │
//!        ▼                                           ▼
//! ┌─────────────────────────────────────────────────────┐
//! │            UpstreamClient::forward (once)           │ ── error ──► 502 / 504
//! └──────────────────────────┬──────────────────────────┘
//!                            │
//!                            ▼
//!           store on MISS when the response qualifies
//! ```
//!
//! # `SharedContext` Pattern
//!
//! The engine holds one `Arc<SharedContext>` with the cache, limiter, upstream client, metrics
//! collector and stats. The server reuses the same context for its admin and stats endpoints.

pub mod engine;
pub mod errors;
pub mod headers;

pub use engine::{EngineConfig, ProxyEngine, SharedContext};
pub use errors::ProxyError;
