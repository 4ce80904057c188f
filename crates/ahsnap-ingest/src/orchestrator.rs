//! Cycle orchestration across all catalog pages
//!
//! Page 0 is fetched first to learn the page count. Every page is then
//! fetched and extracted by its own task; a semaphore bounds how many fetches
//! are in flight and each task reports a [`PageOutcome`] over a channel to a
//! single aggregating loop, which owns the cycle's accumulator. A cycle
//! completes once every page has either succeeded or failed.
//!
//! Payload decoding runs on the blocking pool, and notifications go through
//! a [`NotifyQueue`] so neither holds up page settlement.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache_hint::CacheHint;
use crate::error::{IngestError, IngestResult};
use crate::extractor::{Extraction, RecordExtractor};
use crate::fetcher::PageFetcher;
use crate::models::{CanonicalRecord, RawPage};
use crate::notify::{Notifier, NotifyQueue};

/// Default upper bound on concurrent page fetches
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Default per-fetch timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one ingestion cycle
#[derive(Debug, Clone)]
pub struct CycleResult {
    /// Extracted records in completion order (not page order)
    pub records: Vec<CanonicalRecord>,
    pub succeeded_pages: BTreeSet<u32>,
    pub failed_pages: BTreeSet<u32>,
    pub total_pages: u32,
    /// Cache metadata of the page-0 response
    pub cache_hint: CacheHint,
    pub decode_failures: usize,
    pub elapsed: Duration,
}

impl CycleResult {
    pub fn is_complete(&self) -> bool {
        self.succeeded_pages.len() + self.failed_pages.len() == self.total_pages as usize
    }
}

/// Message from a page task to the aggregator
#[derive(Debug)]
pub enum PageOutcome {
    Succeeded { page: u32, extraction: Extraction },
    Failed { page: u32, error: IngestError },
}

/// Fans fetch + extract out over every page of the catalog
pub struct PaginationOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<RecordExtractor>,
    notifier: Arc<dyn Notifier>,
    max_in_flight: usize,
    fetch_timeout: Duration,
}

impl PaginationOrchestrator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<RecordExtractor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            notifier,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn fetcher(&self) -> &Arc<dyn PageFetcher> {
        &self.fetcher
    }

    /// Run one full cycle over every page
    ///
    /// Fails only when page 0 cannot be fetched or reports no pages; any
    /// other page failure is recorded in `failed_pages`.
    pub async fn run_cycle(&self) -> IngestResult<CycleResult> {
        let started = Instant::now();

        let first = fetch_with_timeout(self.fetcher.as_ref(), 0, self.fetch_timeout)
            .await
            .map_err(IngestError::fatal)?;

        let total_pages = first.total_pages;
        if total_pages == 0 {
            return Err(IngestError::fatal(IngestError::upstream(
                0,
                "catalog reports zero pages",
            )));
        }
        let cache_hint = first.cache_hint;

        info!(total_pages, max_in_flight = self.max_in_flight, "Starting ingestion cycle");
        // delivery continues in the background after the cycle returns
        let (notices, _delivery) = NotifyQueue::spawn(Arc::clone(&self.notifier));
        notices.info(format!("Fetching {} auction pages", total_pages));

        let (tx, mut rx) = mpsc::channel::<PageOutcome>(self.max_in_flight);
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();

        // page 0 was already fetched; only its extraction is dispatched
        {
            let extractor = Arc::clone(&self.extractor);
            let tx = tx.clone();
            tasks.spawn(async move {
                let outcome = extract_page(extractor, 0, first).await;
                let _ = tx.send(outcome).await;
            });
        }

        for page in 1..total_pages {
            let fetcher = Arc::clone(&self.fetcher);
            let extractor = Arc::clone(&self.extractor);
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            let timeout = self.fetch_timeout;

            tasks.spawn(async move {
                let fetched = match semaphore.acquire_owned().await {
                    Ok(_permit) => fetch_with_timeout(fetcher.as_ref(), page, timeout).await,
                    Err(_) => Err(IngestError::upstream(page, "dispatcher closed")),
                };

                let outcome = match fetched {
                    Ok(raw) => {
                        if raw.total_pages != total_pages {
                            debug!(page, reported = raw.total_pages, "Page count changed mid-cycle");
                        }
                        extract_page(extractor, page, raw).await
                    },
                    Err(error) => PageOutcome::Failed { page, error },
                };
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        let mut result = CycleResult {
            records: Vec::new(),
            succeeded_pages: BTreeSet::new(),
            failed_pages: BTreeSet::new(),
            total_pages,
            cache_hint,
            decode_failures: 0,
            elapsed: Duration::ZERO,
        };

        while let Some(outcome) = rx.recv().await {
            record_outcome(&notices, &mut result, outcome);
            if result.is_complete() {
                break;
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Page task did not finish cleanly");
            }
        }

        // a task that panicked never reported; count its page as failed
        if !result.is_complete() {
            let missing: Vec<u32> = (0..total_pages)
                .filter(|p| !result.succeeded_pages.contains(p) && !result.failed_pages.contains(p))
                .collect();
            warn!(pages = ?missing, "Pages settled without reporting an outcome");
            result.failed_pages.extend(missing);
        }

        result.elapsed = started.elapsed();
        report_completion(&notices, &result);

        Ok(result)
    }
}

/// Fold one page outcome into the cycle accumulator
fn record_outcome(notices: &NotifyQueue, result: &mut CycleResult, outcome: PageOutcome) {
    match outcome {
        PageOutcome::Succeeded { page, extraction } => {
            debug!(
                page,
                records = extraction.records.len(),
                decode_failures = extraction.decode_failures.len(),
                "Page extracted"
            );

            if let Some(first) = extraction.decode_failures.first() {
                notices.error(format!(
                    "Page {}: {} item payload(s) could not be decoded (first: {} \"{}\": {})",
                    page,
                    extraction.decode_failures.len(),
                    first.uuid,
                    first.item_name,
                    first.error
                ));
            }

            result.decode_failures += extraction.decode_failures.len();
            result.records.extend(extraction.records);
            result.succeeded_pages.insert(page);
        },
        PageOutcome::Failed { page, error } => {
            result.failed_pages.insert(page);
            warn!(page, error = %error, "Page fetch failed");
            notices.error(format!(
                "Failed to get page {}\nFailed {} pages so far\n\n{}",
                page,
                result.failed_pages.len(),
                error
            ));
        },
    }
}

fn report_completion(notices: &NotifyQueue, result: &CycleResult) {
    info!(
        total_pages = result.total_pages,
        succeeded = result.succeeded_pages.len(),
        failed = result.failed_pages.len(),
        records = result.records.len(),
        decode_failures = result.decode_failures,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "Ingestion cycle complete"
    );

    if !result.failed_pages.is_empty() {
        notices.error(format!(
            "Failed to get {} pages\nSuccessfully got {} pages",
            result.failed_pages.len(),
            result.succeeded_pages.len()
        ));
    }

    notices.info(format!(
        "Got {} auctions from {} pages in {}ms",
        result.records.len(),
        result.succeeded_pages.len(),
        result.elapsed.as_millis()
    ));
}

/// Extract a fetched page on the blocking pool; payload decoding is CPU-bound
async fn extract_page(extractor: Arc<RecordExtractor>, page: u32, raw: RawPage) -> PageOutcome {
    match tokio::task::spawn_blocking(move || extractor.extract(&raw)).await {
        Ok(extraction) => PageOutcome::Succeeded { page, extraction },
        Err(e) => PageOutcome::Failed {
            page,
            error: IngestError::upstream(page, format!("extraction did not complete: {}", e)),
        },
    }
}

/// Fetch one page, turning an elapsed timeout into a page failure
pub async fn fetch_with_timeout(
    fetcher: &dyn PageFetcher,
    page: u32,
    timeout: Duration,
) -> IngestResult<RawPage> {
    tokio::time::timeout(timeout, fetcher.fetch_page(page))
        .await
        .map_err(|_| IngestError::Timeout {
            page,
            secs: timeout.as_secs(),
        })?
}
