//! ahsnap Ingest - auction catalog snapshot tool

use ahsnap_common::logging::{init_logging, LogConfig, LogLevel};
use ahsnap_ingest::{
    config::IngestConfig,
    models::ExtractionMode,
    pipeline,
    snapshot::ReplaceStrategy,
    status::SharedStatus,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ahsnap-ingest")]
#[command(author, version, about = "Auction catalog snapshot ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Extraction mode (best_price or full_detail)
    #[arg(long, global = true, env = "AHSNAP_MODE")]
    mode: Option<ExtractionMode>,

    /// Upstream base URL
    #[arg(long, global = true, env = "AHSNAP_UPSTREAM_URL")]
    upstream_url: Option<String>,

    /// Keep only companion pets (defaults to on in best_price mode)
    #[arg(
        long,
        global = true,
        env = "AHSNAP_PET_FILTER",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pet_filter: Option<bool>,

    /// Maximum concurrent page fetches
    #[arg(long, global = true, env = "AHSNAP_MAX_IN_FLIGHT")]
    max_in_flight: Option<usize>,

    /// Replace strategy (swap or merge_by_key)
    #[arg(long, global = true, env = "AHSNAP_REPLACE_STRATEGY")]
    replace_strategy: Option<ReplaceStrategy>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Poll the catalog until interrupted
    Run,

    /// Run a single cycle, install the snapshot and print a summary
    Once {
        /// Snapshot file to write
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("ahsnap-ingest")
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = log_config.merge_env().context("Invalid logging configuration")?;

    let _log_guard = init_logging(&log_config)?;

    let mut config = IngestConfig::from_env().context("Invalid ingestion configuration")?;
    apply_overrides(&mut config, &cli);
    if let Command::Once {
        output: Some(path),
    } = &cli.command
    {
        config.snapshot_path = Some(path.clone());
    }
    config.validate()?;

    let store = pipeline::open_store(&config).await?;
    let status = SharedStatus::new(config.mode);
    let pipeline::Pipeline {
        poller,
        writer_handle,
    } = pipeline::build(&config, store, status)?;

    match cli.command {
        Command::Run => {
            info!("Starting ingestion loop");
            poller.run_until(shutdown_signal()).await;
        },
        Command::Once { .. } => {
            info!("Running a single ingestion cycle");
            let summary = poller.run_once().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        },
    }

    // closes the writer's queue so pending installs finish
    drop(poller);
    writer_handle.await.context("Snapshot writer task failed")?;

    info!("Ingestion stopped");
    Ok(())
}

fn apply_overrides(config: &mut IngestConfig, cli: &Cli) {
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(pet_filter) = cli.pet_filter {
        config.pet_filter = Some(pet_filter);
    }
    if let Some(url) = &cli.upstream_url {
        config.upstream_url = url.clone();
    }
    if let Some(max_in_flight) = cli.max_in_flight {
        config.max_in_flight = max_in_flight;
    }
    if let Some(strategy) = cli.replace_strategy {
        config.replace_strategy = strategy;
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
