//! ahsnap Server - Main entry point

use ahsnap_common::logging::{init_logging, LogConfig};
use ahsnap_ingest::{config::IngestConfig, pipeline, status::SharedStatus};
use anyhow::{Context, Result};
use std::{net::SocketAddr, time::Duration};
use tokio::{signal, sync::watch};
use tracing::{info, warn};

use ahsnap_server::{config::Config, routes, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging with configuration from environment
    let log_config = LogConfig::builder()
        .log_file_prefix("ahsnap-server")
        .filter_directives("ahsnap_server=debug,ahsnap_ingest=info,tower_http=debug")
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = log_config.merge_env().context("Invalid logging configuration")?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting ahsnap server");

    // Load configuration
    let config = Config::load()?;
    let ingest_config = IngestConfig::from_env().context("Invalid ingestion configuration")?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    // Restore the last snapshot so queries are answered before the first cycle
    let store = pipeline::open_store(&ingest_config).await?;
    let status = SharedStatus::new(ingest_config.mode);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // Start the ingestion poller if enabled
    let ingest_handle = if config.ingest_enabled {
        let pipeline::Pipeline {
            poller,
            writer_handle,
        } = pipeline::build(&ingest_config, store.clone(), status.clone())?;

        let shutdown = wait_for_shutdown(shutdown_rx.clone());
        let handle = tokio::spawn(async move {
            poller.run_until(shutdown).await;
            drop(poller);
            if let Err(e) = writer_handle.await {
                warn!(error = %e, "Snapshot writer task failed");
            }
        });
        info!("Ingestion poller started");
        Some(handle)
    } else {
        info!("Ingestion is disabled (AHSNAP_INGEST_ENABLED=false)");
        None
    };

    // Build the application router
    let state = AppState::new(store, status, config.api.clone());
    let app = routes::router(state, &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await?;

    if let Some(handle) = ingest_handle {
        let grace = Duration::from_secs(config.server.shutdown_timeout_secs);
        info!("Waiting up to {} seconds for ingestion to stop", grace.as_secs());
        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(())) => info!("Ingestion stopped"),
            Ok(Err(e)) => warn!(error = %e, "Ingestion task failed"),
            Err(_) => warn!("Ingestion did not stop within the grace period"),
        }
    }

    info!("Server shut down gracefully");

    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
