//! Snapshot storage
//!
//! A snapshot is the full set of records produced by the last successful
//! cycle. Stores swap it in as a whole; readers only ever observe a complete
//! prior or complete new set. All writes go through one [`SnapshotWriter`]
//! task so installs are serialized in cycle order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

use ahsnap_common::Result;

use crate::error::{IngestError, IngestResult};
use crate::models::{CanonicalRecord, DedupKey};
use crate::notify::Notifier;
use crate::status::SharedStatus;

pub mod file;
pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;
#[cfg(feature = "database")]
pub use postgres::PgSnapshotStore;

/// Storage holding the current snapshot
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Discard the current snapshot and install `records`
    async fn replace_all(&self, records: Vec<CanonicalRecord>) -> Result<()>;

    /// The currently installed snapshot
    async fn load_all(&self) -> Result<Arc<Vec<CanonicalRecord>>>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

/// How an incoming batch combines with the installed snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaceStrategy {
    /// The batch becomes the snapshot
    #[default]
    Swap,
    /// Existing records whose key appears in the batch are dropped, the batch is appended
    MergeByKey,
}

impl ReplaceStrategy {
    pub fn apply(
        &self,
        existing: &[CanonicalRecord],
        incoming: Vec<CanonicalRecord>,
    ) -> Vec<CanonicalRecord> {
        match self {
            ReplaceStrategy::Swap => incoming,
            ReplaceStrategy::MergeByKey => {
                let incoming_keys: HashSet<DedupKey> =
                    incoming.iter().map(CanonicalRecord::key).collect();

                let mut merged: Vec<CanonicalRecord> = existing
                    .iter()
                    .filter(|record| !incoming_keys.contains(&record.key()))
                    .cloned()
                    .collect();
                merged.extend(incoming);
                merged
            },
        }
    }
}

impl std::str::FromStr for ReplaceStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "swap" | "replace" => Ok(ReplaceStrategy::Swap),
            "merge_by_key" | "merge" => Ok(ReplaceStrategy::MergeByKey),
            other => Err(format!("Invalid replace strategy: {}", other)),
        }
    }
}

impl std::fmt::Display for ReplaceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplaceStrategy::Swap => write!(f, "swap"),
            ReplaceStrategy::MergeByKey => write!(f, "merge_by_key"),
        }
    }
}

/// Summary of one installed snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    /// Records in the snapshot after the write
    pub installed: usize,
    pub elapsed: Duration,
}

struct WriteRequest {
    records: Vec<CanonicalRecord>,
    done: Option<oneshot::Sender<IngestResult<WriteReport>>>,
}

/// Handle to the single task that writes snapshots
#[derive(Clone)]
pub struct SnapshotWriter {
    tx: mpsc::Sender<WriteRequest>,
}

impl SnapshotWriter {
    /// Queued batches before `submit` waits for the writer
    pub const QUEUE_DEPTH: usize = 2;

    /// Spawn the writer task; it exits once every handle is dropped
    pub fn spawn(
        store: Arc<dyn SnapshotStore>,
        strategy: ReplaceStrategy,
        notifier: Arc<dyn Notifier>,
        status: Option<SharedStatus>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<WriteRequest>(Self::QUEUE_DEPTH);

        let handle = tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let result = install(store.as_ref(), strategy, request.records).await;

                match &result {
                    Ok(report) => {
                        info!(
                            backend = store.backend(),
                            strategy = %strategy,
                            records = report.installed,
                            elapsed_ms = report.elapsed.as_millis() as u64,
                            "Snapshot installed"
                        );
                        notifier
                            .info(&format!(
                                "Wrote {} records to the {} snapshot in {}ms",
                                report.installed,
                                store.backend(),
                                report.elapsed.as_millis()
                            ))
                            .await;
                        if let Some(status) = &status {
                            status.record_write(report.installed).await;
                        }
                    },
                    Err(e) => {
                        error!(backend = store.backend(), error = %e, "Snapshot write failed");
                        notifier.error(&format!("Snapshot write failed: {}", e)).await;
                        if let Some(status) = &status {
                            status.record_error(e).await;
                        }
                    },
                }

                if let Some(done) = request.done {
                    let _ = done.send(result);
                }
            }
            info!("Snapshot writer stopped");
        });

        (Self { tx }, handle)
    }

    /// Queue a batch without waiting for it to be installed
    pub async fn submit(&self, records: Vec<CanonicalRecord>) -> IngestResult<()> {
        self.tx
            .send(WriteRequest { records, done: None })
            .await
            .map_err(|_| IngestError::Snapshot("snapshot writer has stopped".to_string()))
    }

    /// Queue a batch and wait until it is installed
    pub async fn write(&self, records: Vec<CanonicalRecord>) -> IngestResult<WriteReport> {
        let (done, installed) = oneshot::channel();
        self.tx
            .send(WriteRequest {
                records,
                done: Some(done),
            })
            .await
            .map_err(|_| IngestError::Snapshot("snapshot writer has stopped".to_string()))?;

        installed
            .await
            .map_err(|_| IngestError::Snapshot("snapshot writer dropped the request".to_string()))?
    }
}

async fn install(
    store: &dyn SnapshotStore,
    strategy: ReplaceStrategy,
    records: Vec<CanonicalRecord>,
) -> IngestResult<WriteReport> {
    let started = Instant::now();

    let records = match strategy {
        ReplaceStrategy::Swap => records,
        ReplaceStrategy::MergeByKey => {
            let existing = store.load_all().await?;
            strategy.apply(&existing, records)
        },
    };

    let installed = records.len();
    store.replace_all(records).await?;

    Ok(WriteReport {
        installed,
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::TracingNotifier;

    fn listing(uuid: &str, price: f64) -> CanonicalRecord {
        CanonicalRecord {
            item_id: "HYPERION".to_string(),
            item_name: "Hyperion".to_string(),
            tier: "LEGENDARY".to_string(),
            starting_bid: price,
            enchants: Some(vec![]),
            uuid: Some(uuid.to_string()),
            auctioneer: Some("seller".to_string()),
            end: Some(0),
        }
    }

    #[test]
    fn test_merge_by_key_replaces_matching_and_keeps_rest() {
        let existing = vec![listing("a", 1.0), listing("b", 2.0)];
        let merged = ReplaceStrategy::MergeByKey.apply(&existing, vec![listing("b", 5.0), listing("c", 3.0)]);

        let summary: Vec<(&str, f64)> = merged
            .iter()
            .map(|r| (r.uuid.as_deref().unwrap_or_default(), r.starting_bid))
            .collect();
        assert_eq!(summary, vec![("a", 1.0), ("b", 5.0), ("c", 3.0)]);
    }

    #[test]
    fn test_swap_discards_existing() {
        let existing = vec![listing("a", 1.0)];
        let merged = ReplaceStrategy::Swap.apply(&existing, vec![listing("c", 3.0)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].uuid.as_deref(), Some("c"));
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("merge-by-key".parse::<ReplaceStrategy>(), Ok(ReplaceStrategy::MergeByKey));
        assert_eq!("SWAP".parse::<ReplaceStrategy>(), Ok(ReplaceStrategy::Swap));
        assert!("append".parse::<ReplaceStrategy>().is_err());
        assert_eq!(ReplaceStrategy::MergeByKey.to_string(), "merge_by_key");
    }

    #[tokio::test]
    async fn test_writer_installs_in_order() {
        let store = Arc::new(MemorySnapshotStore::new());
        let (writer, handle) = SnapshotWriter::spawn(
            store.clone(),
            ReplaceStrategy::MergeByKey,
            Arc::new(TracingNotifier),
            None,
        );

        writer.submit(vec![listing("a", 1.0)]).await.unwrap();
        let report = writer.write(vec![listing("b", 2.0)]).await.unwrap();
        assert_eq!(report.installed, 2);

        drop(writer);
        handle.await.unwrap();

        let snapshot = store.load_all().await.unwrap();
        assert_eq!(snapshot.len(), 2);
    }
}
