//! Realtime Price Feed Binary
//!
//! Connects to the price feed server with a static access token and logs
//! price table updates until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin realtime-price-feed
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `PRICE_FEED_WS_URL`: feed endpoint (`wss://host/ws`)
//! - `PRICE_FEED_ACCESS_TOKEN`: bearer token (without it the feed idles signed out)
//!
//! ## Optional
//! - `PRICE_FEED_RECONNECT_DELAY_INITIAL_MS` (default: 1000)
//! - `PRICE_FEED_RECONNECT_DELAY_MAX_MS` (default: 30000)
//! - `PRICE_FEED_RECONNECT_DELAY_MULTIPLIER` (default: 2.0)
//! - `PRICE_FEED_MAX_RECONNECT_ATTEMPTS` (default: 0, unlimited)
//! - `PRICE_FEED_QUEUE_CAPACITY` (default: 1024)
//! - `PRICE_FEED_HEARTBEAT_INTERVAL_SECS` (default: 30)
//! - `PRICE_FEED_HEARTBEAT_TIMEOUT_SECS` (default: 60)
//! - `PRICE_FEED_METRICS_PORT`: Prometheus port (default: 0, disabled)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: Log filter (default: `realtime_price_feed=info`)

use std::sync::Arc;

use realtime_price_feed::infrastructure::telemetry;
use realtime_price_feed::{
    ConnectionState, FeedConfig, PriceObserver, PriceTable, RealtimePriceFeed, WebSocketConnector,
    init_metrics,
};
use tokio::signal;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Observer that logs every table change.
struct LoggingObserver;

impl PriceObserver for LoggingObserver {
    fn on_prices(&self, prices: &PriceTable) {
        for (symbol, quote) in prices.iter() {
            tracing::debug!(
                %symbol,
                ltp = %quote.last_price,
                day_change = %quote.day_change,
                "Price"
            );
        }
        tracing::info!(symbols = prices.len(), "Price table updated");
    }

    fn on_state(&self, state: ConnectionState) {
        tracing::info!(%state, "Feed state changed");
    }

    fn on_error(&self, error: &str) {
        tracing::warn!(error, "Feed error");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting realtime price feed");

    let config = FeedConfig::from_env()?;
    log_config(&config);

    if config.metrics_port != 0 {
        init_metrics(config.metrics_port)?;
    }

    let shutdown_token = CancellationToken::new();

    let connector = WebSocketConnector::new(config.ws_url.clone()).with_heartbeat(config.heartbeat());
    let (_credential_tx, credential_rx) = watch::channel(config.credential());

    if config.access_token.is_none() {
        tracing::warn!("PRICE_FEED_ACCESS_TOKEN not set, feed will stay disconnected");
    }

    let handle = RealtimePriceFeed::new(Arc::new(connector))
        .with_options(config.feed_options())
        .with_shutdown(shutdown_token.clone())
        .start(credential_rx, Arc::new(LoggingObserver));

    await_shutdown().await;

    handle.stop().await;
    shutdown_token.cancel();

    tracing::info!("Realtime price feed stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &FeedConfig) {
    tracing::info!(
        ws_url = %config.ws_url,
        has_token = config.access_token.is_some(),
        queue_capacity = config.websocket.queue_capacity,
        max_reconnect_attempts = config.websocket.max_reconnect_attempts,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
