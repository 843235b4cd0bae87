//! Mock infrastructure for gateway tests.
//!
//! - `UpstreamMockBuilder`: wraps mockito with OpenAI-style response helpers
//! - `test_helpers`: gateway construction and request helpers
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{build_gateway, test_config, UpstreamMockBuilder};
//!
//! let mut upstream = UpstreamMockBuilder::new().await;
//! let mock = upstream.mock_chat_completion(1).await;
//! let (app, _state) = build_gateway(test_config(&upstream.url()));
//! ```

pub mod test_helpers;
pub mod upstream_mock;

pub use test_helpers::*;
pub use upstream_mock::{chat_completion_body, UpstreamMockBuilder, CHAT_PATH};
