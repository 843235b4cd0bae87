use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Proxy};
use std::{sync::Arc, time::Duration};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::upstream::{UpstreamClient, UpstreamError, UpstreamRequest, UpstreamResponse};

/// Configuration for the upstream HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL requests are forwarded to, e.g. `https://api.openai.com`.
    pub base_url: String,
    /// Maximum number of concurrent upstream requests allowed
    pub concurrent_limit: usize,
    /// Permit acquisition timeout in milliseconds
    pub permit_timeout_ms: u64,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Optional outbound proxy for all upstream traffic
    pub proxy_url: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            concurrent_limit: 1000,
            permit_timeout_ms: 500,
            connect_timeout_ms: 5_000,
            proxy_url: None,
        }
    }
}

/// Reqwest-backed [`UpstreamClient`] with semaphore-based concurrency control.
///
/// Requests are sent exactly once. Redirects are not followed so the client sees what the
/// upstream returned.
pub struct HttpClient {
    client: Client,
    base_url: String,
    concurrent_limit: Arc<Semaphore>,
    config: HttpClientConfig,
}

/// RAII guard ensuring semaphore permits are always released.
///
/// Uses [`OwnedSemaphorePermit`] which owns an `Arc` to the semaphore,
/// making it safe to hold across async boundaries.
struct PermitGuard {
    _permit: OwnedSemaphorePermit,
    semaphore: Arc<Semaphore>,
}

impl PermitGuard {
    fn new(permit: OwnedSemaphorePermit, semaphore: Arc<Semaphore>) -> Self {
        Self { _permit: permit, semaphore }
    }

    fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        tracing::trace!(
            available_permits = self.semaphore.available_permits(),
            "permit guard dropped"
        );
    }
}

impl HttpClient {
    /// Creates a new HTTP client forwarding to `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new(base_url: impl Into<String>) -> Result<Self, UpstreamError> {
        Self::with_config(HttpClientConfig { base_url: base_url.into(), ..Default::default() })
    }

    /// Sanitizes network errors to prevent information disclosure.
    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_timeout() {
            "connection timed out".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() {
            "response body error".to_string()
        } else if error.is_decode() {
            "response decode error".to_string()
        } else if error.is_redirect() {
            "too many redirects".to_string()
        } else {
            "network error".to_string()
        }
    }

    /// Creates a new HTTP client with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy URL is invalid or the reqwest client fails to build.
    pub fn with_config(config: HttpClientConfig) -> Result<Self, UpstreamError> {
        let mut builder = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(100)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("sluice/", env!("CARGO_PKG_VERSION")))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true);

        if let Some(proxy_url) = config.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                tracing::error!(error = %e, "invalid outbound proxy url");
                UpstreamError::InvalidRequest(format!("invalid proxy url: {e}"))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            tracing::error!(error = %e, "failed to build http client");
            UpstreamError::ConnectionFailed(format!("HTTP client build failed: {e}"))
        })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            concurrent_limit: Arc::new(Semaphore::new(config.concurrent_limit)),
            config,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn acquire_permit(&self, url: &str) -> Result<PermitGuard, UpstreamError> {
        let permit_timeout = Duration::from_millis(self.config.permit_timeout_ms);

        let permit = tokio::time::timeout(
            permit_timeout,
            Arc::clone(&self.concurrent_limit).acquire_owned(),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                url = url,
                available_permits = self.concurrent_limit.available_permits(),
                "http client semaphore acquisition timeout"
            );
            UpstreamError::ConcurrencyLimit("no upstream permit available".to_string())
        })?
        .map_err(|_| {
            tracing::warn!(url = url, "http client semaphore closed");
            UpstreamError::ConcurrencyLimit("upstream client shut down".to_string())
        })?;

        Ok(PermitGuard::new(permit, self.concurrent_limit.clone()))
    }

    #[cfg(test)]
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.concurrent_limit.available_permits()
    }
}

#[async_trait]
impl UpstreamClient for HttpClient {
    /// Sends the request once, buffering the full response body.
    ///
    /// Non-2xx upstream statuses are returned as responses, not errors.
    async fn forward(
        &self,
        request: UpstreamRequest,
        timeout: Duration,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = format!("{}{}", self.base_url, request.path_and_query);
        let permit_guard = self.acquire_permit(&url).await?;

        tracing::trace!(
            available_permits = permit_guard.available_permits(),
            "http request started"
        );

        let result = self
            .client
            .request(request.method, &url)
            .headers(request.headers)
            // PERF: Bytes is reference counted, handing it to reqwest does not copy the body
            .body(request.body)
            .timeout(timeout)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::trace!(
                    available_permits = permit_guard.available_permits(),
                    "http request error"
                );
                if e.is_timeout() {
                    return Err(UpstreamError::Timeout);
                }
                if e.is_builder() {
                    return Err(UpstreamError::InvalidRequest(Self::sanitize_network_error(&e)));
                }
                return Err(UpstreamError::ConnectionFailed(Self::sanitize_network_error(&e)));
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Network(e)
            }
        })?;

        tracing::trace!(
            status = status.as_u16(),
            available_permits = permit_guard.available_permits(),
            "http request completed"
        );

        Ok(UpstreamResponse { status, headers, body })
    }
}
