//! In-process snapshot store

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use ahsnap_common::Result;

use super::SnapshotStore;
use crate::models::CanonicalRecord;

/// Holds the snapshot behind an `Arc` that is swapped on every install
///
/// Readers clone the `Arc` and keep a consistent view for as long as they
/// hold it, regardless of later installs.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    current: RwLock<Arc<Vec<CanonicalRecord>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<CanonicalRecord>) -> Self {
        Self {
            current: RwLock::new(Arc::new(records)),
        }
    }

    pub async fn len(&self) -> usize {
        self.current.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.current.read().await.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn replace_all(&self, records: Vec<CanonicalRecord>) -> Result<()> {
        let next = Arc::new(records);
        *self.current.write().await = next;
        Ok(())
    }

    async fn load_all(&self) -> Result<Arc<Vec<CanonicalRecord>>> {
        Ok(Arc::clone(&*self.current.read().await))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
