//! Catalog data models
//!
//! Upstream wire shapes (`RawPage`, `RawEntry`) and the stored
//! `CanonicalRecord`.

use serde::{Deserialize, Serialize};

use crate::cache_hint::CacheHint;

/// Body of `GET /auctions?page=N`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBody {
    #[serde(default)]
    pub page: u32,
    pub total_pages: u32,
    #[serde(default)]
    pub auctions: Vec<RawEntry>,
}

/// One fetched page plus the cache metadata of the response it came from
#[derive(Debug, Clone)]
pub struct RawPage {
    pub page: u32,
    pub total_pages: u32,
    pub auctions: Vec<RawEntry>,
    pub cache_hint: CacheHint,
}

impl RawPage {
    pub fn from_body(page: u32, body: PageBody, cache_hint: CacheHint) -> Self {
        Self {
            page,
            total_pages: body.total_pages,
            auctions: body.auctions,
            cache_hint,
        }
    }
}

/// A single upstream listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEntry {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub auctioneer: String,
    /// Expiry, epoch milliseconds
    #[serde(default)]
    pub end: i64,
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub item_lore: String,
    /// Base64 item payload
    #[serde(default)]
    pub item_bytes: String,
    #[serde(default)]
    pub starting_bid: f64,
    #[serde(default)]
    pub tier: String,
    #[serde(default)]
    pub bin: bool,
}

/// How a cycle's records are keyed and merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// One cheapest record per (item id, tier)
    #[default]
    BestPrice,
    /// One record per listing with seller, expiry and enchantments
    FullDetail,
}

impl std::str::FromStr for ExtractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "best_price" | "bestprice" => Ok(ExtractionMode::BestPrice),
            "full_detail" | "fulldetail" => Ok(ExtractionMode::FullDetail),
            other => Err(format!("Invalid extraction mode: {}", other)),
        }
    }
}

impl std::fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionMode::BestPrice => write!(f, "best_price"),
            ExtractionMode::FullDetail => write!(f, "full_detail"),
        }
    }
}

/// The unit stored in the snapshot and served to readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub item_id: String,
    pub item_name: String,
    pub tier: String,
    pub starting_bid: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enchants: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auctioneer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
}

/// Identity under which records collapse
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DedupKey {
    BestPrice { item_id: String, tier: String },
    Listing(String),
}

impl CanonicalRecord {
    /// Listing records carry their auction id; everything else keys by item and tier.
    pub fn key(&self) -> DedupKey {
        match &self.uuid {
            Some(uuid) => DedupKey::Listing(uuid.clone()),
            None => DedupKey::BestPrice {
                item_id: self.item_id.clone(),
                tier: self.tier.clone(),
            },
        }
    }
}
