//! Record deduplication
//!
//! Best-price mode collapses listings of the same item and tier into the
//! cheapest one. Full-detail mode keeps every listing; only an auction id seen
//! twice in one cycle (listings shift between pages while a cycle runs)
//! collapses, first-seen wins.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::models::{CanonicalRecord, DedupKey, ExtractionMode};

/// Merge one cycle's records according to `mode`
pub fn merge(records: Vec<CanonicalRecord>, mode: ExtractionMode) -> Vec<CanonicalRecord> {
    match mode {
        ExtractionMode::BestPrice => merge_best_price(records),
        ExtractionMode::FullDetail => retain_listings(records),
    }
}

/// Lowest `starting_bid` per `(item_id, tier)`; ties keep the first seen
pub fn merge_best_price(records: Vec<CanonicalRecord>) -> Vec<CanonicalRecord> {
    let mut merged: Vec<CanonicalRecord> = Vec::new();
    let mut index: HashMap<DedupKey, usize> = HashMap::new();

    for record in records {
        let key = DedupKey::BestPrice {
            item_id: record.item_id.clone(),
            tier: record.tier.clone(),
        };

        match index.entry(key) {
            Entry::Occupied(slot) => {
                let current = &mut merged[*slot.get()];
                if record.starting_bid < current.starting_bid {
                    *current = record;
                }
            },
            Entry::Vacant(slot) => {
                slot.insert(merged.len());
                merged.push(record);
            },
        }
    }

    merged
}

/// One record per auction id
pub fn retain_listings(records: Vec<CanonicalRecord>) -> Vec<CanonicalRecord> {
    let mut seen: HashSet<DedupKey> = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|record| seen.insert(record.key()))
        .collect()
}
