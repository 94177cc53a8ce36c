//! Command-line entry point for flexibee-sync
//!
//! Runs until SIGINT or SIGTERM:
//!
//! ```bash
//! FLEXIBEE_URL=https://demo.flexibee.eu:5434 FLEXIBEE_COMPANY=demo \
//! FLEXIBEE_USERNAME=winstrom FLEXIBEE_PASSWORD=winstrom \
//! DATABASE_URL=postgres://localhost/flexibee \
//! flexibee-sync --log-format text
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use flexibee_source::FlexibeeClient;
use flexibee_sync::{Config, Engine, LogFormat, Settings};
use postgresql_sink::PostgresStore;
use sync_core::EntityCatalog;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let settings = Config::parse().validate()?;
    init_tracing(&settings);

    let catalog = Arc::new(EntityCatalog::flexibee_default());
    tracing::info!(
        entities = catalog.len(),
        company = %settings.flexibee.company,
        "Starting flexibee-sync"
    );

    let source = Arc::new(
        FlexibeeClient::new(settings.flexibee.clone()).context("Failed to build HTTP client")?,
    );
    let store = Arc::new(
        PostgresStore::connect(&settings.database_url, settings.engine.concurrency).await?,
    );

    let cancel = CancellationToken::new();
    spawn_shutdown_handler(cancel.clone());

    let engine = Engine::new(source, store, catalog, settings.engine.clone());
    engine.start(cancel).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// RUST_LOG takes precedence over --log-level.
fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_env("RUST_LOG")
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match settings.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Cancel `cancel` on SIGINT or SIGTERM.
fn spawn_shutdown_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for SIGINT: {e}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::error!("Failed to listen for SIGTERM: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = interrupt => tracing::info!("Received SIGINT, shutting down"),
            _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
        }
        cancel.cancel();
    });
}
