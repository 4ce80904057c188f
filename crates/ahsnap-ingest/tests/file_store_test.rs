//! File-backed snapshot store

use ahsnap_ingest::models::CanonicalRecord;
use ahsnap_ingest::notify::TracingNotifier;
use ahsnap_ingest::snapshot::{FileSnapshotStore, ReplaceStrategy, SnapshotStore, SnapshotWriter};
use std::sync::Arc;
use tempfile::TempDir;

fn listing(uuid: &str, price: f64) -> CanonicalRecord {
    CanonicalRecord {
        item_id: "JUJU_SHORTBOW".to_string(),
        item_name: "Juju Shortbow".to_string(),
        tier: "EPIC".to_string(),
        starting_bid: price,
        enchants: Some(vec!["POWER;6".to_string()]),
        uuid: Some(uuid.to_string()),
        auctioneer: Some("seller".to_string()),
        end: Some(1_700_000_000_000),
    }
}

#[tokio::test]
async fn test_snapshot_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("snapshot.json");

    let store = FileSnapshotStore::open(&path).await.unwrap();
    assert!(store.load_all().await.unwrap().is_empty());
    store
        .replace_all(vec![listing("a", 1.0), listing("b", 2.0)])
        .await
        .unwrap();

    let reopened = FileSnapshotStore::open(&path).await.unwrap();
    let records = reopened.load_all().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0], listing("a", 1.0));

    // no temp file left next to the snapshot
    assert!(!path.with_extension("tmp").exists());
}

#[tokio::test]
async fn test_replace_discards_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("snapshot.json");

    let store = FileSnapshotStore::open(&path).await.unwrap();
    store.replace_all(vec![listing("a", 1.0)]).await.unwrap();
    store.replace_all(vec![listing("c", 3.0)]).await.unwrap();

    let on_disk: Vec<CanonicalRecord> =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk, vec![listing("c", 3.0)]);
}

#[tokio::test]
async fn test_merge_by_key_through_writer() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileSnapshotStore::open(dir.path().join("snapshot.json")).await.unwrap());
    let (writer, handle) = SnapshotWriter::spawn(
        store.clone(),
        ReplaceStrategy::MergeByKey,
        Arc::new(TracingNotifier),
        None,
    );

    writer.write(vec![listing("a", 1.0), listing("b", 2.0)]).await.unwrap();
    let report = writer.write(vec![listing("b", 5.0)]).await.unwrap();
    assert_eq!(report.installed, 2);

    drop(writer);
    handle.await.unwrap();

    let records = store.load_all().await.unwrap();
    let b = records.iter().find(|r| r.uuid.as_deref() == Some("b")).unwrap();
    assert_eq!(b.starting_bid, 5.0);
}

#[tokio::test]
async fn test_corrupt_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("snapshot.json");
    std::fs::write(&path, b"{ not a snapshot").unwrap();

    let err = FileSnapshotStore::open(&path).await.unwrap_err();
    assert!(err.to_string().contains("Corrupt snapshot file"));
}
