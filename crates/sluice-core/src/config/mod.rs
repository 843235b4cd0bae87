//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations below
//! 2. **Config file**: TOML file named by the `SLUICE_CONFIG` env var (default
//!    `config/config.toml`, optional)
//! 3. **Environment variables**: `SLUICE__SECTION__FIELD` overrides a single field. List fields
//!    take comma-separated values (`SLUICE__CACHE__CACHEABLE_PATHS=/v1/a,/v1/b`)
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: bind address, concurrency and body limits
//! - [`UpstreamConfig`]: where requests are forwarded and with which credential
//! - [`CacheConfig`]: response cache sizing, TTL and cacheability rules
//! - [`RateLimitConfig`]: per-client token bucket settings
//! - [`AdminConfig`]: administrative endpoints
//! - [`LoggingConfig`]: log level and format
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_port = 8080
//!
//! [upstream]
//! base_url = "https://api.openai.com"
//! timeout_secs = 30
//!
//! [cache]
//! ttl_secs = 300
//! capacity = 10000
//!
//! [rate_limit]
//! max_tokens = 60
//! refill_per_second = 1.0
//! ```

use crate::{
    cache::{CachePolicy, CredentialScope, KeyDeriver},
    proxy::engine::EngineConfig,
    upstream::HttpClientConfig,
};
use config::{Config, ConfigError, Environment, File};
use http::{HeaderName, Method};
use serde::{Deserialize, Serialize};
use std::{path::Path, str::FromStr, time::Duration};

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `127.0.0.1`.
    pub bind_address: String,

    /// Port number to listen on. Must be greater than 0. Defaults to `3030`.
    pub bind_port: u16,

    /// Maximum number of requests processed concurrently. Defaults to `1000`.
    pub max_concurrent_requests: usize,

    /// Largest accepted request body in bytes. Defaults to 10 MiB.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            bind_port: 3030,
            max_concurrent_requests: 1000,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Upstream API the gateway forwards to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL, e.g. `https://api.openai.com`. Must start with `http`.
    pub base_url: String,

    /// Per-request timeout in seconds. Must be greater than 0. Defaults to `30`.
    pub timeout_secs: u64,

    /// Credential sent upstream instead of the client's, when set.
    pub api_key: Option<String>,

    /// Outbound HTTP(S) proxy for upstream traffic.
    pub proxy_url: Option<String>,

    /// Maximum concurrent upstream requests. Defaults to `1000`.
    pub concurrent_limit: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            timeout_secs: 30,
            api_key: None,
            proxy_url: None,
            concurrent_limit: 1000,
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether caching is enabled. Defaults to `true`.
    pub enabled: bool,

    /// Entry time-to-live in seconds. `0` stores nothing. Defaults to `300`.
    pub ttl_secs: u64,

    /// Maximum number of entries. `0` stores nothing. Defaults to `10000`.
    pub capacity: usize,

    /// Only store 2xx responses. Defaults to `true`.
    pub success_only: bool,

    /// Methods eligible for caching. Defaults to `["GET", "POST"]`.
    pub cacheable_methods: Vec<String>,

    /// Paths on which non-idempotent methods are cached.
    pub cacheable_paths: Vec<String>,

    /// Whether entries are partitioned by client credential. Defaults to `per_credential`.
    pub credential_scope: CredentialScope,

    /// Request headers whose values are folded into the cache key.
    pub vary_headers: Vec<String>,

    /// Interval of the expired-entry sweep in seconds. `0` disables it. Defaults to `60`.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let policy = CachePolicy::default();
        Self {
            enabled: policy.enabled,
            ttl_secs: 300,
            capacity: 10_000,
            success_only: policy.success_only,
            cacheable_methods: policy.cacheable_methods.iter().map(ToString::to_string).collect(),
            cacheable_paths: policy.cacheable_paths,
            credential_scope: CredentialScope::default(),
            vary_headers: Vec::new(),
            sweep_interval_secs: 60,
        }
    }
}

/// Per-client token bucket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Bucket size (burst). Defaults to `60`.
    pub max_tokens: u32,

    /// Tokens restored per second. Defaults to `1.0`.
    pub refill_per_second: f64,

    /// Maximum number of tracked clients. Defaults to `100000`.
    pub max_buckets: usize,

    /// Seconds of inactivity after which a client's bucket is dropped. Defaults to `300`.
    pub idle_ttl_secs: u64,

    /// Interval of the idle bucket sweep in seconds. `0` disables it. Defaults to `300`.
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tokens: 60,
            refill_per_second: 1.0,
            max_buckets: 100_000,
            idle_ttl_secs: 300,
            cleanup_interval_secs: 300,
        }
    }
}

/// Administrative endpoints configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Whether `/admin/*` and `DELETE /cache` are mounted. Defaults to `true`.
    pub enabled: bool,

    /// Value expected in `X-Admin-Token`. Admin routes are open when unset.
    pub token: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { enabled: true, token: None }
    }
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Root application configuration containing all subsystem settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `SLUICE__` prefix override any value, using `__` as the
    /// separator for nested fields (e.g., `SLUICE__RATE_LIMIT__MAX_TOKENS=120`). The cache's
    /// method, path and vary-header lists are split on commas.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix("SLUICE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cache.cacheable_methods")
                    .with_list_parse_key("cache.cacheable_paths")
                    .with_list_parse_key("cache.vary_headers"),
            )
            .build()?
            .try_deserialize()
    }

    /// Loads configuration from `SLUICE_CONFIG` (default `config/config.toml`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("SLUICE_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }

        if self.server.max_concurrent_requests == 0 {
            return Err("Max concurrent requests must be greater than 0".to_string());
        }

        if self.upstream.base_url.is_empty() || !self.upstream.base_url.starts_with("http") {
            return Err(format!("Invalid upstream base URL: {:?}", self.upstream.base_url));
        }

        if let Some(proxy) = &self.upstream.proxy_url {
            if !proxy.starts_with("http") && !proxy.starts_with("socks") {
                return Err(format!("Invalid upstream proxy URL: {proxy}"));
            }
        }

        if self.upstream.timeout_secs == 0 {
            return Err("Upstream timeout must be greater than 0".to_string());
        }

        if self.upstream.concurrent_limit == 0 {
            return Err("Upstream concurrent limit must be greater than 0".to_string());
        }

        for method in &self.cache.cacheable_methods {
            Method::from_str(&method.to_ascii_uppercase())
                .map_err(|_| format!("Invalid cacheable method: {method}"))?;
        }

        for name in &self.cache.vary_headers {
            HeaderName::from_str(&name.to_ascii_lowercase())
                .map_err(|_| format!("Invalid vary header name: {name}"))?;
        }

        if !self.rate_limit.refill_per_second.is_finite() || self.rate_limit.refill_per_second < 0.0
        {
            return Err("Rate limit refill rate must be a non-negative number".to_string());
        }

        if self.rate_limit.max_buckets == 0 {
            return Err("Rate limit max buckets must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }

    /// Returns the parsed socket address for the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.server.bind_address, self.server.bind_port).parse().map_err(|_| {
            format!("Invalid socket address: {}:{}", self.server.bind_address, self.server.bind_port)
        })
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout_secs)
    }

    /// Cacheability rules. Unparseable methods are skipped; `validate` reports them.
    #[must_use]
    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            enabled: self.cache.enabled,
            success_only: self.cache.success_only,
            cacheable_methods: self
                .cache
                .cacheable_methods
                .iter()
                .filter_map(|m| Method::from_str(&m.to_ascii_uppercase()).ok())
                .collect(),
            cacheable_paths: self.cache.cacheable_paths.clone(),
        }
    }

    #[must_use]
    pub fn key_deriver(&self) -> KeyDeriver {
        let vary = self
            .cache
            .vary_headers
            .iter()
            .filter_map(|h| HeaderName::from_str(&h.to_ascii_lowercase()).ok())
            .collect();
        KeyDeriver::new(self.cache.credential_scope, vary)
    }

    #[must_use]
    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            base_url: self.upstream.base_url.clone(),
            concurrent_limit: self.upstream.concurrent_limit,
            proxy_url: self.upstream.proxy_url.clone(),
            ..HttpClientConfig::default()
        }
    }

    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            policy: self.cache_policy(),
            key_deriver: self.key_deriver(),
            upstream_timeout: self.upstream_timeout(),
            upstream_api_key: self.upstream.api_key.clone().filter(|k| !k.is_empty()),
        }
    }
}
