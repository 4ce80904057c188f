//! PostgreSQL snapshot store
//!
//! Records are kept as JSONB rows in `auction_snapshot`. An install deletes
//! every row and inserts the new batch inside one transaction, so other
//! connections see either snapshot in full. Reads are served from an
//! in-memory mirror loaded at connect time.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::QueryBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use ahsnap_common::{AhsnapError, Result};

use super::{MemorySnapshotStore, SnapshotStore};
use crate::models::CanonicalRecord;

/// Rows per multi-value INSERT
const CHUNK_SIZE: usize = 500;

pub struct PgSnapshotStore {
    pool: PgPool,
    memory: MemorySnapshotStore,
}

impl PgSnapshotStore {
    /// Connect, create the table when missing and load the stored snapshot
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(db_error)?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS auction_snapshot (
                position INTEGER NOT NULL PRIMARY KEY,
                record JSONB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(db_error)?;

        let rows: Vec<(Json<CanonicalRecord>,)> =
            sqlx::query_as("SELECT record FROM auction_snapshot ORDER BY position")
                .fetch_all(&pool)
                .await
                .map_err(db_error)?;

        let records: Vec<CanonicalRecord> = rows.into_iter().map(|(Json(r),)| r).collect();
        info!(records = records.len(), "Loaded snapshot from PostgreSQL");

        Ok(Self {
            pool,
            memory: MemorySnapshotStore::with_records(records),
        })
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn replace_all(&self, records: Vec<CanonicalRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query("DELETE FROM auction_snapshot")
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        for (chunk_idx, chunk) in records.chunks(CHUNK_SIZE).enumerate() {
            let offset = chunk_idx * CHUNK_SIZE;
            let mut query_builder = QueryBuilder::new("INSERT INTO auction_snapshot (position, record) ");
            query_builder.push_values(chunk.iter().enumerate(), |mut b, (i, record)| {
                b.push_bind((offset + i) as i32).push_bind(Json(record));
            });
            query_builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;

        self.memory.replace_all(records).await
    }

    async fn load_all(&self) -> Result<Arc<Vec<CanonicalRecord>>> {
        self.memory.load_all().await
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

fn db_error(err: sqlx::Error) -> AhsnapError {
    AhsnapError::Database(err.to_string())
}
