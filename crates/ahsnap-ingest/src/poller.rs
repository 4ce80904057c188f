//! Continuous ingestion loop
//!
//! Each iteration runs one cycle, hands the merged records to the snapshot
//! writer and sleeps until the upstream catalog is expected to refresh. The
//! sleep is derived from the catalog's cache headers: an optional fixed floor
//! first, then the remaining freshness of a cache hint.

use serde::Serialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::cache_hint::{CacheHint, FALLBACK_WAIT_SECS};
use crate::dedup;
use crate::error::IngestResult;
use crate::models::ExtractionMode;
use crate::notify::Notifier;
use crate::orchestrator::{CycleResult, PaginationOrchestrator};
use crate::snapshot::{SnapshotWriter, WriteReport};
use crate::status::SharedStatus;

/// Summary of one cycle, as printed by `ahsnap-ingest once`
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub mode: ExtractionMode,
    pub total_pages: u32,
    pub succeeded_pages: BTreeSet<u32>,
    pub failed_pages: BTreeSet<u32>,
    pub extracted_records: usize,
    pub merged_records: usize,
    pub decode_failures: usize,
    pub elapsed_ms: u64,
    pub next_wait_secs: u64,
    /// Snapshot size after the write, when the write was awaited
    pub installed_records: Option<usize>,
}

pub struct AdaptivePoller {
    orchestrator: PaginationOrchestrator,
    writer: SnapshotWriter,
    mode: ExtractionMode,
    min_idle: Duration,
    status: SharedStatus,
    notifier: Arc<dyn Notifier>,
}

/// What the sleep after a cycle is computed from
struct Settled {
    cache_hint: Option<CacheHint>,
    started: Instant,
    failed: bool,
}

impl AdaptivePoller {
    pub fn new(
        orchestrator: PaginationOrchestrator,
        writer: SnapshotWriter,
        mode: ExtractionMode,
        status: SharedStatus,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            orchestrator,
            writer,
            mode,
            min_idle: Duration::ZERO,
            status,
            notifier,
        }
    }

    /// Fixed sleep before the adaptive wait
    pub fn with_min_idle(mut self, min_idle: Duration) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn status(&self) -> &SharedStatus {
        &self.status
    }

    /// Run a single cycle and wait for its snapshot to be installed
    pub async fn run_once(&self) -> IngestResult<CycleSummary> {
        self.status.record_cycle_started().await;

        let result = match self.orchestrator.run_cycle().await {
            Ok(result) => result,
            Err(e) => {
                self.status.record_cycle_failed(&e).await;
                return Err(e);
            },
        };
        self.status.record_cycle(&result).await;

        let mut summary = self.summarize(&result);
        let records = dedup::merge(result.records, self.mode);
        summary.merged_records = records.len();

        let report: WriteReport = self.writer.write(records).await?;
        summary.installed_records = Some(report.installed);

        Ok(summary)
    }

    /// Poll until `shutdown` resolves
    ///
    /// A cycle already running when shutdown is requested is finished and
    /// handed to the writer; the sleep that would follow is skipped.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stopping = false;

        info!(mode = %self.mode, min_idle_secs = self.min_idle.as_secs(), "Poller started");

        loop {
            let cycle = self.cycle();
            tokio::pin!(cycle);

            let settled = loop {
                tokio::select! {
                    settled = &mut cycle => break settled,
                    _ = &mut shutdown, if !stopping => {
                        stopping = true;
                        info!("Shutdown requested, finishing the current cycle");
                    },
                }
            };

            if stopping {
                break;
            }

            tokio::select! {
                _ = self.pause(settled) => {},
                _ = &mut shutdown => break,
            }
        }

        info!("Poller stopped");
    }

    /// One loop iteration: cycle, status, hand-off to the writer
    async fn cycle(&self) -> Settled {
        let started = Instant::now();
        self.status.record_cycle_started().await;

        match self.orchestrator.run_cycle().await {
            Ok(result) => {
                self.status.record_cycle(&result).await;
                let cache_hint = Some(result.cache_hint);

                let records = dedup::merge(result.records, self.mode);
                info!(records = records.len(), mode = %self.mode, "Merged cycle records");

                if let Err(e) = self.writer.submit(records).await {
                    error!(error = %e, "Failed to hand records to the snapshot writer");
                    self.status.record_error(&e).await;
                }

                Settled {
                    cache_hint,
                    started,
                    failed: false,
                }
            },
            Err(e) => {
                error!(error = %e, "Ingestion cycle failed, keeping previous snapshot");
                self.notifier.error(&format!("Ingestion cycle failed: {}", e)).await;
                self.status.record_cycle_failed(&e).await;

                Settled {
                    cache_hint: None,
                    started,
                    failed: true,
                }
            },
        }
    }

    async fn pause(&self, settled: Settled) {
        if !self.min_idle.is_zero() {
            info!(secs = self.min_idle.as_secs(), "Idling before next cycle");
            tokio::time::sleep(self.min_idle).await;
        }

        // after a floor or a failed cycle the page-0 hint is stale or absent
        let fresh = if !self.min_idle.is_zero() || settled.failed {
            match self.orchestrator.fetcher().fresh_cache_hint().await {
                Ok(hint) => Some(hint),
                Err(e) => {
                    warn!(error = %e, "Cache hint refresh failed");
                    None
                },
            }
        } else {
            None
        };

        let wait = adaptive_wait(fresh, settled.cache_hint, settled.started.elapsed());
        self.status.record_wait(wait).await;

        info!(secs = wait.as_secs(), "Waiting for next catalog refresh");
        tokio::time::sleep(wait).await;
    }

    fn summarize(&self, result: &CycleResult) -> CycleSummary {
        CycleSummary {
            mode: self.mode,
            total_pages: result.total_pages,
            succeeded_pages: result.succeeded_pages.clone(),
            failed_pages: result.failed_pages.clone(),
            extracted_records: result.records.len(),
            merged_records: 0,
            decode_failures: result.decode_failures,
            elapsed_ms: result.elapsed.as_millis() as u64,
            next_wait_secs: result.cache_hint.aged(result.elapsed).wait_secs(),
            installed_records: None,
        }
    }
}

/// Sleep before the next cycle
///
/// A freshly fetched hint wins; otherwise the cycle's own hint, aged by the
/// time since it was fetched; with neither, the fixed fallback.
pub fn adaptive_wait(
    fresh: Option<CacheHint>,
    cycle_hint: Option<CacheHint>,
    since_fetch: Duration,
) -> Duration {
    match (fresh, cycle_hint) {
        (Some(hint), _) => hint.wait(),
        (None, Some(hint)) => hint.aged(since_fetch).wait(),
        (None, None) => Duration::from_secs(FALLBACK_WAIT_SECS),
    }
}
