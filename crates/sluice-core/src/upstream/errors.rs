use thiserror::Error;

/// Errors that can occur when forwarding to the upstream API.
///
/// None of these are retried. Every variant surfaces to the client as a gateway error and is
/// never cached.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Request exceeded the configured timeout duration.
    #[error("Request timeout")]
    Timeout,

    /// Failed to establish a connection to the upstream endpoint.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Network-level error from the underlying HTTP client.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Request could not be built for the upstream (bad method, header or URL).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Maximum concurrent upstream requests limit has been reached.
    #[error("Concurrency limit reached: {0}")]
    ConcurrencyLimit(String),
}

impl UpstreamError {
    /// Returns a static string representation for metrics labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::Network(_) => "network",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ConcurrencyLimit(_) => "concurrency_limit",
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Network(e) => e.is_timeout(),
            _ => false,
        }
    }
}
