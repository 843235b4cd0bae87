use anyhow::Result;
use axum::serve;
use server::{create_app, AppState};
use sluice_core::{config::AppConfig, upstream::HttpClient};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{signal, sync::broadcast};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise crate-level filtering follows `logging.level`.
fn init_logging(config: &AppConfig) {
    let level = config.logging.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,sluice_core={level},server={level},audit={level}"))
    });

    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config =
        AppConfig::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;
    config.validate().map_err(|e| anyhow::anyhow!("Configuration validation failed: {e}"))?;

    init_logging(&config);
    info!("Starting Sluice gateway");
    debug!(
        upstream = %config.upstream.base_url,
        cache_enabled = config.cache.enabled,
        cache_ttl_secs = config.cache.ttl_secs,
        cache_capacity = config.cache.capacity,
        rate_limit_max_tokens = config.rate_limit.max_tokens,
        rate_limit_refill_per_second = config.rate_limit.refill_per_second,
        "Configuration loaded"
    );
    if config.admin.enabled && config.admin.token.as_deref().map_or(true, str::is_empty) {
        warn!("admin endpoints are enabled without a token");
    }

    let upstream = HttpClient::with_config(config.http_client_config())
        .map_err(|e| anyhow::anyhow!("Upstream client initialization failed: {e}"))?;
    let addr = config.socket_addr().map_err(anyhow::Error::msg)?;
    let sweep_interval = Duration::from_secs(config.cache.sweep_interval_secs);

    let state = AppState::from_config(config, Arc::new(upstream));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let cache_sweep =
        state.proxy_engine.cache().start_cleanup_task(sweep_interval, shutdown_tx.subscribe());
    let bucket_sweep = state.proxy_engine.rate_limiter().start_cleanup_task(shutdown_tx.subscribe());

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "Gateway listening");

    if let Err(e) = serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error occurred");
    }

    let _ = shutdown_tx.send(());
    for handle in [cache_sweep, bucket_sweep].into_iter().flatten() {
        if let Err(e) = handle.await {
            error!(error = %e, "background task terminated abnormally");
        }
    }
    info!("Server shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                () = std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, draining in-flight requests");
}
