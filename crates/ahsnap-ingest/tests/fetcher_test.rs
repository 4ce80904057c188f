//! HTTP page fetcher against a stubbed catalog

mod common;

use ahsnap_ingest::cache_hint::CacheAge;
use ahsnap_ingest::fetcher::{HttpPageFetcher, PageFetcher};
use ahsnap_ingest::IngestError;
use common::*;
use std::time::Duration;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

#[tokio::test]
async fn test_fetch_page_parses_body_and_headers() {
    init_tracing();
    let server = MockServer::start().await;
    let listing = pet_listing("a1", "EPIC", 100.0, true);
    assert_fixture_is_pet(&listing);
    mount_page(&server, 3, page_body(3, 7, vec![listing]), "10").await;

    let fetcher = HttpPageFetcher::new(upstream_url(&server), Duration::from_secs(5)).unwrap();
    let page = fetcher.fetch_page(3).await.unwrap();

    assert_eq!(page.page, 3);
    assert_eq!(page.total_pages, 7);
    assert_eq!(page.auctions.len(), 1);
    assert_eq!(page.auctions[0].uuid, "a1");
    assert!(page.auctions[0].bin);
    assert_eq!(page.cache_hint.age, CacheAge::Seconds(10));
    assert_eq!(page.cache_hint.wait_secs(), 52);
}

#[tokio::test]
async fn test_http_error_is_upstream_failure() {
    let server = MockServer::start().await;
    mount_failure(&server, 2, 503).await;

    let fetcher = HttpPageFetcher::new(upstream_url(&server), Duration::from_secs(5)).unwrap();
    let err = fetcher.fetch_page(2).await.unwrap_err();

    match err {
        IngestError::Upstream { page, message } => {
            assert_eq!(page, 2);
            assert!(message.contains("503"));
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_upstream_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
        .mount(&server)
        .await;

    let fetcher = HttpPageFetcher::new(upstream_url(&server), Duration::from_secs(5)).unwrap();
    let err = fetcher.fetch_page(0).await.unwrap_err();

    assert!(matches!(err, IngestError::Upstream { page: 0, .. }));
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page_body(0, 1, vec![]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let fetcher = HttpPageFetcher::new(upstream_url(&server), Duration::from_millis(200)).unwrap();
    let err = fetcher.fetch_page(0).await.unwrap_err();

    assert!(matches!(err, IngestError::Timeout { page: 0, .. }));
}

#[tokio::test]
async fn test_fresh_hint_reads_only_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("page", "0"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Age", "45")
                .insert_header("Cache-Control", "s-maxage=60")
                .set_body_string("not json"),
        )
        .mount(&server)
        .await;

    let fetcher = HttpPageFetcher::new(upstream_url(&server), Duration::from_secs(5)).unwrap();
    let hint = fetcher.fresh_cache_hint().await.unwrap();

    assert_eq!(hint.wait_secs(), 17);
}

#[tokio::test]
async fn test_missing_cache_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(page_body(0, 1, vec![])))
        .mount(&server)
        .await;

    let fetcher = HttpPageFetcher::new(upstream_url(&server), Duration::from_secs(5)).unwrap();
    let hint = fetcher.fresh_cache_hint().await.unwrap();

    // no Age header means the catalog is already due
    assert_eq!(hint.age, CacheAge::Missing);
    assert_eq!(hint.wait_secs(), 0);
}
