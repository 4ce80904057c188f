//! Ingestion status
//!
//! Owned by the poller and snapshot writer, read by the query server's
//! `/information` endpoint.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::IngestError;
use crate::models::ExtractionMode;
use crate::orchestrator::CycleResult;

/// Point-in-time view of the pipeline
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionStatus {
    pub mode: ExtractionMode,
    /// When this process started tracking ingestion
    pub started_at: Option<DateTime<Utc>>,
    /// A cycle is fetching pages right now
    pub currently_updating: bool,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub total_pages: u32,
    pub succeeded_pages: usize,
    pub failed_pages: Vec<u32>,
    pub decode_failures: usize,
    /// Records produced by the last cycle, before any merge
    pub cycle_records: usize,
    /// Records in the installed snapshot
    pub snapshot_records: usize,
    pub last_cycle_ms: u64,
    pub next_wait_secs: u64,
    pub last_cycle_started: Option<DateTime<Utc>>,
    pub last_cycle_finished: Option<DateTime<Utc>>,
    /// When the installed snapshot was written
    pub last_updated: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl IngestionStatus {
    /// Whole seconds since the snapshot was last installed
    pub fn seconds_since_update(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_updated.map(|at| (now - at).num_seconds().max(0))
    }
}

/// Cheaply cloneable handle to the live status
#[derive(Debug, Clone, Default)]
pub struct SharedStatus {
    inner: Arc<RwLock<IngestionStatus>>,
}

impl SharedStatus {
    pub fn new(mode: ExtractionMode) -> Self {
        Self {
            inner: Arc::new(RwLock::new(IngestionStatus {
                mode,
                started_at: Some(Utc::now()),
                ..IngestionStatus::default()
            })),
        }
    }

    pub async fn snapshot(&self) -> IngestionStatus {
        self.inner.read().await.clone()
    }

    pub async fn record_cycle_started(&self) {
        let mut status = self.inner.write().await;
        status.currently_updating = true;
        status.last_cycle_started = Some(Utc::now());
    }

    pub async fn record_cycle(&self, result: &CycleResult) {
        let mut status = self.inner.write().await;
        status.cycles_completed += 1;
        status.currently_updating = false;
        status.total_pages = result.total_pages;
        status.succeeded_pages = result.succeeded_pages.len();
        status.failed_pages = result.failed_pages.iter().copied().collect();
        status.decode_failures = result.decode_failures;
        status.cycle_records = result.records.len();
        status.last_cycle_ms = result.elapsed.as_millis() as u64;
        status.last_cycle_finished = Some(Utc::now());
        status.last_error = None;
    }

    pub async fn record_cycle_failed(&self, error: &IngestError) {
        let mut status = self.inner.write().await;
        status.cycles_failed += 1;
        status.currently_updating = false;
        status.last_cycle_finished = Some(Utc::now());
        status.last_error = Some(error.to_string());
    }

    pub async fn record_write(&self, installed: usize) {
        let mut status = self.inner.write().await;
        status.snapshot_records = installed;
        status.last_updated = Some(Utc::now());
    }

    pub async fn record_error(&self, error: &IngestError) {
        self.inner.write().await.last_error = Some(error.to_string());
    }

    pub async fn record_wait(&self, wait: Duration) {
        self.inner.write().await.next_wait_secs = wait.as_secs();
    }
}
