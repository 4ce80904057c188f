//! Shared handler state

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahsnap_ingest::snapshot::SnapshotStore;
use ahsnap_ingest::status::SharedStatus;

use crate::config::ApiConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SnapshotStore>,
    pub status: SharedStatus,
    pub api: Arc<ApiConfig>,
    pub counters: Arc<RequestCounters>,
}

impl AppState {
    pub fn new(store: Arc<dyn SnapshotStore>, status: SharedStatus, api: ApiConfig) -> Self {
        Self {
            store,
            status,
            api: Arc::new(api),
            counters: Arc::new(RequestCounters::default()),
        }
    }
}

/// Query requests seen since start, split by key check outcome
#[derive(Debug, Default)]
pub struct RequestCounters {
    authorized: AtomicU64,
    unauthorized: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RequestCounts {
    pub authorized: u64,
    pub unauthorized: u64,
}

impl RequestCounters {
    pub fn record(&self, authorized: bool) {
        let counter = if authorized {
            &self.authorized
        } else {
            &self.unauthorized
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counts(&self) -> RequestCounts {
        RequestCounts {
            authorized: self.authorized.load(Ordering::Relaxed),
            unauthorized: self.unauthorized.load(Ordering::Relaxed),
        }
    }
}
