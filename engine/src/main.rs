//! Slotbook service process.
//!
//! Connects to `PostgreSQL`, runs migrations, starts the notification
//! dispatcher and status scheduler, and waits for a shutdown signal.

use anyhow::Context;
use slotbook_core::environment::SystemClock;
use slotbook_engine::{Config, Slotbook, build_email_client};
use slotbook_postgres::PgBookingStore;
use slotbook_runtime::metrics::MetricsServer;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            return Err(error).context("reading .env");
        }
    }

    let config = Config::from_env().context("loading configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.default_log_filter()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate().context("validating configuration")?;
    info!(
        provider = ?config.email.provider,
        workers = config.dispatcher.max_workers,
        strict = config.anti_scalping.strict_enabled,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.metrics_addr()?);
    metrics.start().context("starting metrics server")?;

    info!("Connecting to database...");
    let store = PgBookingStore::connect(&config.pool_config())
        .await
        .context("connecting to database")?;
    store.migrate().await.context("running migrations")?;
    info!("Database ready");

    let client = build_email_client(&config.email).context("building email client")?;
    let mut app = Slotbook::start(&config, store, client, Arc::new(SystemClock));

    shutdown_signal().await;

    info!("Shutting down...");
    if let Err(e) = app.shutdown(config.shutdown_timeout()).await {
        error!(error = %e, "Graceful shutdown incomplete");
    }
    info!("Slotbook stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
