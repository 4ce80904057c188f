//! JSON file-backed snapshot store
//!
//! The snapshot is served from memory and mirrored to disk. Each install is
//! written to a sibling temp file and renamed over the target, so the file on
//! disk is always one complete snapshot.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use ahsnap_common::{AhsnapError, Result};

use super::{MemorySnapshotStore, SnapshotStore};
use crate::models::CanonicalRecord;

#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
    memory: MemorySnapshotStore,
}

impl FileSnapshotStore {
    /// Open the store, restoring any snapshot already at `path`
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<CanonicalRecord>>(&bytes).map_err(|e| {
                AhsnapError::Parse(format!("Corrupt snapshot file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        info!(path = ?path, records = records.len(), "Opened snapshot file");

        Ok(Self {
            path,
            memory: MemorySnapshotStore::with_records(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_file(&self, records: &[CanonicalRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec(records)?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path).await?;

        debug!(path = ?self.path, size_bytes = data.len(), "Wrote snapshot file");
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn replace_all(&self, records: Vec<CanonicalRecord>) -> Result<()> {
        // disk first: a failed write leaves both copies on the previous snapshot
        self.write_file(&records).await?;
        self.memory.replace_all(records).await
    }

    async fn load_all(&self) -> Result<Arc<Vec<CanonicalRecord>>> {
        self.memory.load_all().await
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}
