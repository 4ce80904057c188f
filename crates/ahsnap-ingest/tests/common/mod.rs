//! Shared fixtures for ingestion integration tests

#![allow(dead_code)]

use ahsnap_ingest::extractor::PET_MARKER;
use ahsnap_ingest::nbt::{encode, Tag};
use base64::Engine;
use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

pub const CATALOG_PATH: &str = "/skyblock/auctions";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ahsnap_ingest=debug")
        .with_test_writer()
        .try_init();
}

/// Base URL the fetcher should be pointed at
pub fn upstream_url(server: &MockServer) -> String {
    format!("{}/skyblock", server.uri())
}

/// Base64 gzip payload carrying `ExtraAttributes.id`
pub fn payload(id: &str) -> String {
    encoded(Tag::compound([("id", Tag::string(id))]))
}

/// Pet payload: id `PET` plus the JSON `petInfo` string naming the species
pub fn pet_payload(species: &str) -> String {
    let info = json!({ "type": species, "active": false, "exp": 0.0, "tier": "EPIC" });
    encoded(Tag::compound([
        ("id", Tag::string("PET")),
        ("petInfo", Tag::string(info.to_string())),
    ]))
}

fn encoded(extra_attributes: Tag) -> String {
    let root = Tag::compound([(
        "i",
        Tag::List(vec![Tag::compound([(
            "tag",
            Tag::compound([("ExtraAttributes", extra_attributes)]),
        )])]),
    )]);
    base64::engine::general_purpose::STANDARD.encode(encode("", &root, true))
}

pub fn pet_listing(uuid: &str, tier: &str, price: f64, bin: bool) -> Value {
    json!({
        "uuid": uuid,
        "auctioneer": "seller",
        "end": 1_700_000_000_000_i64,
        "item_name": "[Lvl 100] Ender Dragon",
        "item_lore": "§6Combat Pet\n\n§eRight-click to add this pet to\n§eyour pet menu!",
        "item_bytes": pet_payload("ENDER_DRAGON"),
        "starting_bid": price,
        "tier": tier,
        "bin": bin,
        "category": "misc",
    })
}

pub fn page_body(page: u32, total_pages: u32, auctions: Vec<Value>) -> Value {
    json!({
        "success": true,
        "page": page,
        "totalPages": total_pages,
        "totalAuctions": auctions.len(),
        "lastUpdated": 1_700_000_000_000_i64,
        "auctions": auctions,
    })
}

pub async fn mount_page(server: &MockServer, page: u32, body: Value, age: &str) {
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("page", page.to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Age", age)
                .insert_header("Cache-Control", "public, max-age=60, s-maxage=60")
                .set_body_json(body),
        )
        .mount(server)
        .await;
}

pub async fn mount_failure(server: &MockServer, page: u32, status: u16) {
    Mock::given(method("GET"))
        .and(path(CATALOG_PATH))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Sanity check that fixtures carry the marker the pet filter looks for
pub fn assert_fixture_is_pet(listing: &Value) {
    let lore = listing["item_lore"].as_str().unwrap_or_default();
    assert!(lore.contains(PET_MARKER));
}
