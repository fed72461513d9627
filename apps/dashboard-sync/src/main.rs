//! Dashboard Sync Binary
//!
//! Runs the positions, portfolio and activity feeds against the trading
//! service and logs their views as they change.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin dashboard-sync
//! ```
//!
//! # Environment Variables
//!
//! - `DASHBOARD_WS_URL`: Streaming base URL (default: `ws://localhost:8000`)
//! - `DASHBOARD_API_URL`: REST base URL (default: `http://localhost:8000`)
//! - `DASHBOARD_KEEPALIVE_INTERVAL_SECS`: Ping interval (default: 30)
//! - `DASHBOARD_RECONNECT_INTERVAL_MS`: Reconnect delay (default: 3000)
//! - `DASHBOARD_MAX_RECONNECT_ATTEMPTS`: Reconnect bound (default: 5)
//! - `DASHBOARD_BATCH_INTERVAL_MS`: Debounce window (default: 100)
//! - `DASHBOARD_FALLBACK_REFRESH_SECS`: REST refresh while disconnected (default: 30, 0 = off)
//! - `DASHBOARD_METRICS_PORT`: Prometheus port (default: 0 = off)
//! - `OTEL_ENABLED`: Export traces over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashboard_sync::infrastructure::telemetry;
use dashboard_sync::{
    Channel, ConnectionStatus, DeliveryMode, Feed, FeedReconciler, RestClient, SyncConfig,
    TransportConfig, init_metrics,
};
use dashboard_sync::{ActivitySync, PortfolioSync, PositionSync};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("rustls crypto provider already installed"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Dashboard Sync");

    let config = SyncConfig::from_env()?;
    log_config(&config);

    if config.server.metrics_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.metrics_port));
        let _handle = init_metrics(Some(addr))?;
        tracing::info!(%addr, "Metrics exporter listening");
    }

    let rest = Arc::new(RestClient::new(&config.endpoints.api_url)?);
    let shutdown_token = CancellationToken::new();
    let ws_url = config.endpoints.ws_url.as_str();
    let batch_interval = config.feeds.batch_interval;

    // Positions
    let positions = PositionSync::new(
        Arc::clone(&rest) as _,
        config.feeds.positions_capacity,
        batch_interval,
    );
    let positions_view = positions.subscribe();
    let positions_feed = Feed::new(
        positions,
        TransportConfig::from_websocket_settings(ws_url, Channel::Positions, &config.websocket),
    )
    .with_fallback_refresh(config.feeds.fallback_refresh);

    // Portfolio, on its own positions connection
    let portfolio = PortfolioSync::new(
        Arc::clone(&rest) as _,
        Arc::clone(&rest) as _,
        batch_interval,
    );
    let portfolio_view = portfolio.subscribe();
    let portfolio_feed = Feed::new(
        portfolio,
        TransportConfig::from_websocket_settings(ws_url, Channel::Positions, &config.websocket),
    )
    .with_fallback_refresh(config.feeds.fallback_refresh);

    // Activity
    let activity = ActivitySync::new(Arc::clone(&rest) as _, config.feeds.activity_capacity);
    let activity_view = activity.subscribe();
    let activity_feed = Feed::new(
        activity,
        TransportConfig::from_websocket_settings(ws_url, Channel::Signals, &config.websocket)
            .with_delivery(DeliveryMode::Batched {
                interval: batch_interval,
                per_message: false,
            }),
    )
    .with_fallback_refresh(config.feeds.fallback_refresh);

    spawn_status_logger(
        "positions",
        positions_feed.transport().watch_status(),
        shutdown_token.clone(),
    );
    spawn_status_logger(
        "portfolio",
        portfolio_feed.transport().watch_status(),
        shutdown_token.clone(),
    );
    spawn_status_logger(
        "activity",
        activity_feed.transport().watch_status(),
        shutdown_token.clone(),
    );

    spawn_view_logger(positions_view, shutdown_token.clone(), |view| {
        tracing::info!(
            open = view.positions.len(),
            error = view.last_error.as_deref(),
            "Positions updated"
        );
    });
    spawn_view_logger(portfolio_view, shutdown_token.clone(), |view| {
        if let Some(stats) = &view.stats {
            tracing::info!(
                total_value = %stats.total_value,
                unrealized_pnl = %stats.unrealized_pnl,
                open_positions = stats.open_positions,
                "Portfolio updated"
            );
        }
        if let Some(error) = &view.last_error {
            tracing::warn!(%error, "Portfolio stale");
        }
    });
    spawn_view_logger(activity_view, shutdown_token.clone(), |view| {
        if let Some(latest) = view.items.first() {
            tracing::info!(
                entries = view.items.len(),
                latest = %latest.description,
                "Activity updated"
            );
        }
    });

    let feeds = vec![
        spawn_feed(positions_feed, shutdown_token.clone()),
        spawn_feed(portfolio_feed, shutdown_token.clone()),
        spawn_feed(activity_feed, shutdown_token.clone()),
    ];

    tracing::info!("Dashboard sync ready");

    await_shutdown(shutdown_token).await;

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, futures::future::join_all(feeds)).await;
    if drained.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Feeds did not stop in time"
        );
    }

    tracing::info!("Dashboard sync stopped");
    Ok(())
}

/// Run a feed on its own task.
fn spawn_feed<R>(feed: Feed<R>, shutdown_token: CancellationToken) -> JoinHandle<()>
where
    R: FeedReconciler + 'static,
{
    tokio::spawn(async move {
        let reconciler = feed.run(shutdown_token).await;
        tracing::debug!(feed = reconciler.name(), "Feed task finished");
    })
}

/// Log connection status transitions for one feed.
fn spawn_status_logger(
    feed: &'static str,
    mut status: watch::Receiver<ConnectionStatus>,
    shutdown_token: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shutdown_token.cancelled() => break,
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *status.borrow_and_update();
                    match current {
                        ConnectionStatus::Connected => tracing::info!(feed, "Stream connected"),
                        ConnectionStatus::Error => tracing::warn!(feed, "Stream error"),
                        other => tracing::debug!(feed, status = other.as_str(), "Stream status"),
                    }
                }
            }
        }
    });
}

/// Call `log` with every published view.
fn spawn_view_logger<T, F>(mut view: watch::Receiver<T>, shutdown_token: CancellationToken, log: F)
where
    T: Send + Sync + 'static,
    F: Fn(&T) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shutdown_token.cancelled() => break,
                changed = view.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    log(&view.borrow_and_update());
                }
            }
        }
    });
}

/// Load .env file from current or ancestor directories.
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

/// Log the parsed configuration.
fn log_config(config: &SyncConfig) {
    tracing::info!(
        ws_url = %config.endpoints.ws_url,
        api_url = %config.endpoints.api_url,
        metrics_port = config.server.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        keepalive_secs = config.websocket.keepalive_interval.as_secs(),
        reconnect_ms = config.websocket.reconnect_interval.as_millis(),
        max_reconnect_attempts = config.websocket.max_reconnect_attempts,
        batch_ms = config.feeds.batch_interval.as_millis(),
        "Feed settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
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

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
