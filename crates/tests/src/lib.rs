//! Integration tests for the Sluice gateway.
//!
//! Every test drives the real router (or a real listener) against a `mockito` upstream, so the
//! whole path is exercised: header filtering, key derivation, rate limiting, reqwest forwarding
//! and response caching.
//!
//! - `caching_tests`: hit/miss behavior, credential partitioning, invalidation, TTL
//! - `rate_limit_tests`: per-client admission over the router and a real socket
//! - `upstream_tests`: failure mapping, credential substitution and header forwarding
//! - `mock_infrastructure`: reusable upstream mocks and gateway builders
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```

pub mod mock_infrastructure;

#[cfg(test)]
mod caching_tests;

#[cfg(test)]
mod rate_limit_tests;

#[cfg(test)]
mod upstream_tests;
