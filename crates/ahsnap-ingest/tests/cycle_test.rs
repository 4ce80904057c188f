//! Full ingestion cycles against a stubbed catalog

mod common;

use ahsnap_ingest::dedup;
use ahsnap_ingest::extractor::RecordExtractor;
use ahsnap_ingest::fetcher::HttpPageFetcher;
use ahsnap_ingest::models::{CanonicalRecord, ExtractionMode};
use ahsnap_ingest::notify::TracingNotifier;
use ahsnap_ingest::orchestrator::PaginationOrchestrator;
use ahsnap_ingest::poller::AdaptivePoller;
use ahsnap_ingest::snapshot::{MemorySnapshotStore, ReplaceStrategy, SnapshotStore, SnapshotWriter};
use ahsnap_ingest::status::SharedStatus;
use common::*;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

fn orchestrator(server: &MockServer, mode: ExtractionMode, pet_filter: bool) -> PaginationOrchestrator {
    let fetcher = HttpPageFetcher::new(upstream_url(server), Duration::from_secs(5)).unwrap();
    let extractor = RecordExtractor::new(mode, pet_filter).unwrap();
    PaginationOrchestrator::new(Arc::new(fetcher), Arc::new(extractor), Arc::new(TracingNotifier))
        .with_max_in_flight(4)
}

fn poller(
    server: &MockServer,
    mode: ExtractionMode,
    store: Arc<MemorySnapshotStore>,
) -> AdaptivePoller {
    let status = SharedStatus::new(mode);
    let (writer, _handle) = SnapshotWriter::spawn(
        store,
        ReplaceStrategy::Swap,
        Arc::new(TracingNotifier),
        Some(status.clone()),
    );
    AdaptivePoller::new(
        orchestrator(server, mode, mode == ExtractionMode::BestPrice),
        writer,
        mode,
        status,
        Arc::new(TracingNotifier),
    )
}

fn non_pet_listing(uuid: &str, price: f64) -> Value {
    json!({
        "uuid": uuid,
        "auctioneer": "seller",
        "end": 1_700_000_000_000_i64,
        "item_name": "Hyperion",
        "item_lore": "§7Gear Score: §d620",
        "item_bytes": payload("HYPERION"),
        "starting_bid": price,
        "tier": "LEGENDARY",
        "bin": true,
    })
}

/// Three pages; page 2 is down
async fn three_page_catalog() -> MockServer {
    let server = MockServer::start().await;
    mount_page(&server, 0, page_body(0, 3, vec![pet_listing("p0", "EPIC", 100.0, true)]), "5").await;
    mount_page(
        &server,
        1,
        page_body(
            1,
            3,
            vec![
                pet_listing("p1", "EPIC", 80.0, true),
                pet_listing("p1-auction", "EPIC", 10.0, false),
            ],
        ),
        "5",
    )
    .await;
    mount_failure(&server, 2, 500).await;
    server
}

#[tokio::test]
async fn test_partial_catalog_keeps_cheapest_of_reachable_pages() {
    init_tracing();
    let server = three_page_catalog().await;

    let result = orchestrator(&server, ExtractionMode::BestPrice, true)
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(result.total_pages, 3);
    assert_eq!(result.succeeded_pages, BTreeSet::from([0, 1]));
    assert_eq!(result.failed_pages, BTreeSet::from([2]));
    assert_eq!(result.succeeded_pages.len() + result.failed_pages.len(), 3);

    let merged = dedup::merge(result.records, ExtractionMode::BestPrice);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].item_id, "ENDER_DRAGON");
    assert_eq!(merged[0].tier, "EPIC");
    assert_eq!(merged[0].starting_bid, 80.0);
}

#[tokio::test]
async fn test_page_zero_is_requested_once() {
    let server = three_page_catalog().await;

    orchestrator(&server, ExtractionMode::BestPrice, true)
        .run_cycle()
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let page_zero = requests
        .iter()
        .filter(|r| r.url.query() == Some("page=0"))
        .count();
    assert_eq!(page_zero, 1);
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn test_unreachable_catalog_is_fatal() {
    let server = MockServer::start().await;
    mount_failure(&server, 0, 502).await;

    let err = orchestrator(&server, ExtractionMode::BestPrice, true)
        .run_cycle()
        .await
        .unwrap_err();

    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_pet_filter_and_full_detail() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        0,
        page_body(
            0,
            1,
            vec![
                pet_listing("p0", "EPIC", 100.0, true),
                non_pet_listing("h0", 900_000_000.0),
                non_pet_listing("h1", 850_000_000.0),
            ],
        ),
        "0",
    )
    .await;

    let pets = orchestrator(&server, ExtractionMode::BestPrice, true)
        .run_cycle()
        .await
        .unwrap();
    assert_eq!(pets.records.len(), 1);

    let listings = orchestrator(&server, ExtractionMode::FullDetail, false)
        .run_cycle()
        .await
        .unwrap();
    let merged = dedup::merge(listings.records, ExtractionMode::FullDetail);
    assert_eq!(merged.len(), 3);
    assert!(merged.iter().all(|r| r.uuid.is_some() && r.auctioneer.is_some()));
    assert!(merged.iter().all(|r| r.enchants == Some(vec![])));
}

fn sorted(records: &[CanonicalRecord]) -> Vec<CanonicalRecord> {
    let mut records = records.to_vec();
    records.sort_by(|a, b| a.key().cmp(&b.key()));
    records
}

#[tokio::test]
async fn test_unchanged_catalog_yields_identical_snapshots() {
    let server = three_page_catalog().await;
    let store = Arc::new(MemorySnapshotStore::new());
    let poller = poller(&server, ExtractionMode::BestPrice, Arc::clone(&store));

    poller.run_once().await.unwrap();
    let first = store.load_all().await.unwrap();
    poller.run_once().await.unwrap();
    let second = store.load_all().await.unwrap();

    assert_eq!(sorted(&first), sorted(&second));
    assert_eq!(poller.status().snapshot().await.cycles_completed, 2);
}

#[tokio::test]
async fn test_listing_order_does_not_change_snapshot() {
    let listings = vec![
        pet_listing("a", "EPIC", 300.0, true),
        pet_listing("b", "LEGENDARY", 700.0, true),
        pet_listing("c", "EPIC", 200.0, true),
        pet_listing("d", "LEGENDARY", 650.0, true),
    ];
    let mut reversed = listings.clone();
    reversed.reverse();

    let mut snapshots = Vec::new();
    for auctions in [listings, reversed] {
        let server = MockServer::start().await;
        mount_page(&server, 0, page_body(0, 1, auctions), "0").await;

        let store = Arc::new(MemorySnapshotStore::new());
        poller(&server, ExtractionMode::BestPrice, Arc::clone(&store))
            .run_once()
            .await
            .unwrap();
        snapshots.push(sorted(&store.load_all().await.unwrap()));
    }

    assert_eq!(snapshots[0], snapshots[1]);
    let prices: Vec<f64> = snapshots[0].iter().map(|r| r.starting_bid).collect();
    assert_eq!(prices, vec![200.0, 650.0]);
}
