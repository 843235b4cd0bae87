use crate::upstream::errors::UpstreamError;
use http::StatusCode;
use std::time::Duration;

/// Terminal failure of one request. Other requests are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Admission denied by the token bucket. Not retried by the gateway.
    #[error("Rate limit exceeded")]
    RateLimited { remaining: u64, retry_after: Option<Duration> },

    /// Preserves concrete `UpstreamError` type for status mapping and metrics labels.
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Unexpected gateway fault. Logged with context; clients only see a generic message.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// HTTP status returned to the client.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to clients.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::RateLimited { .. } => "rate limit exceeded".to_string(),
            Self::Upstream(e) if e.is_timeout() => "upstream request timed out".to_string(),
            Self::Upstream(e) => format!("upstream request failed: {}", e.as_str()),
            Self::Internal(_) => "internal server error".to_string(),
        }
    }
}
