//! Wiring of the ingestion components from an [`IngestConfig`]

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{IngestConfig, DEFAULT_WEBHOOK_USERNAME};
use crate::error::{IngestError, IngestResult};
use crate::extractor::RecordExtractor;
use crate::fetcher::HttpPageFetcher;
use crate::notify::{Notifier, TracingNotifier, WebhookNotifier};
use crate::orchestrator::PaginationOrchestrator;
use crate::poller::AdaptivePoller;
use crate::snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, SnapshotWriter};
use crate::status::SharedStatus;

/// A poller plus the writer task it feeds
pub struct Pipeline {
    pub poller: AdaptivePoller,
    pub writer_handle: JoinHandle<()>,
}

/// Open the snapshot backend selected by the configuration
///
/// PostgreSQL when the `database` feature is built and `DATABASE_URL` is set,
/// else a JSON file when a snapshot path is set, else memory only.
pub async fn open_store(config: &IngestConfig) -> IngestResult<Arc<dyn SnapshotStore>> {
    #[cfg(feature = "database")]
    {
        if let Some(url) = &config.database_url {
            let store = crate::snapshot::PgSnapshotStore::connect(url).await?;
            info!(backend = "postgres", "Snapshot store ready");
            return Ok(Arc::new(store));
        }
    }

    if let Some(path) = &config.snapshot_path {
        let store = FileSnapshotStore::open(path).await?;
        info!(backend = "file", path = ?path, "Snapshot store ready");
        return Ok(Arc::new(store));
    }

    info!(backend = "memory", "Snapshot store ready");
    Ok(Arc::new(MemorySnapshotStore::new()))
}

pub fn notifier(config: &IngestConfig) -> IngestResult<Arc<dyn Notifier>> {
    match &config.webhook_url {
        Some(url) => {
            let webhook = WebhookNotifier::new(url.clone(), DEFAULT_WEBHOOK_USERNAME)
                .map_err(|e| IngestError::Config(format!("Failed to build webhook client: {}", e)))?;
            Ok(Arc::new(webhook))
        },
        None => Ok(Arc::new(TracingNotifier)),
    }
}

/// Build the poller and spawn its snapshot writer
pub fn build(
    config: &IngestConfig,
    store: Arc<dyn SnapshotStore>,
    status: SharedStatus,
) -> IngestResult<Pipeline> {
    let notifier = notifier(config)?;

    let fetcher = HttpPageFetcher::new(&config.upstream_url, config.fetch_timeout())?;
    let extractor = RecordExtractor::new(config.mode, config.pet_filter())?;

    let orchestrator =
        PaginationOrchestrator::new(Arc::new(fetcher), Arc::new(extractor), Arc::clone(&notifier))
            .with_max_in_flight(config.max_in_flight)
            .with_fetch_timeout(config.fetch_timeout());

    let (writer, writer_handle) = SnapshotWriter::spawn(
        store,
        config.replace_strategy,
        Arc::clone(&notifier),
        Some(status.clone()),
    );

    let poller = AdaptivePoller::new(orchestrator, writer, config.mode, status, notifier)
        .with_min_idle(config.min_idle());

    info!(
        upstream = %config.upstream_url,
        mode = %config.mode,
        pet_filter = config.pet_filter(),
        max_in_flight = config.max_in_flight,
        replace_strategy = %config.replace_strategy,
        "Ingestion pipeline assembled"
    );

    Ok(Pipeline {
        poller,
        writer_handle,
    })
}
