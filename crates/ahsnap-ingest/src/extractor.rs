//! Per-page record extraction
//!
//! Filters a page's listings, decodes each included payload and builds
//! canonical records. Extraction never fails as a whole: payload decode
//! errors are collected per listing and the listing is still emitted with
//! whatever could be recovered.

use regex::Regex;
use std::borrow::Cow;

use crate::error::{DecodeError, IngestError, IngestResult};
use crate::models::{CanonicalRecord, ExtractionMode, RawEntry, RawPage};
use crate::nbt::{self, DecodedItem};

/// Lore text present on every companion-pet item
pub const PET_MARKER: &str = "Right-click to add this pet to\n§eyour pet menu";

/// Item id shared by every companion pet whatever its species
pub const PET_ID: &str = "PET";

/// Generic display name shared by all enchanted books
pub const ENCHANTED_BOOK: &str = "Enchanted Book";

/// Item id shared by all enchanted books
pub const ENCHANTED_BOOK_ID: &str = "ENCHANTED_BOOK";

/// Formatting codes: the section sign followed by a color or style character
const COLOR_CODE_PATTERN: &str = r"(?i)\x{00A7}[0-9A-FK-OR]";

/// A listing whose payload could not be decoded
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeFailure {
    pub uuid: String,
    pub item_name: String,
    pub error: DecodeError,
}

/// Result of extracting one page
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: Vec<CanonicalRecord>,
    pub decode_failures: Vec<DecodeFailure>,
}

/// Builds canonical records from raw listings
#[derive(Debug, Clone)]
pub struct RecordExtractor {
    mode: ExtractionMode,
    pet_filter: bool,
    color_codes: Regex,
}

impl RecordExtractor {
    pub fn new(mode: ExtractionMode, pet_filter: bool) -> IngestResult<Self> {
        let color_codes = Regex::new(COLOR_CODE_PATTERN)
            .map_err(|e| IngestError::Config(format!("Invalid color code pattern: {}", e)))?;

        Ok(Self {
            mode,
            pet_filter,
            color_codes,
        })
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// Inclusion predicate: immediate-purchase, and a pet when filtering pets
    pub fn includes(&self, entry: &RawEntry) -> bool {
        entry.bin && (!self.pet_filter || entry.item_lore.contains(PET_MARKER))
    }

    pub fn strip_color_codes<'a>(&self, text: &'a str) -> Cow<'a, str> {
        self.color_codes.replace_all(text, "")
    }

    /// Name carried into the record; enchanted books take their first lore line
    pub fn display_name(&self, entry: &RawEntry) -> String {
        if entry.item_name != ENCHANTED_BOOK {
            return entry.item_name.clone();
        }

        let first_line = entry.item_lore.split('\n').next().unwrap_or_default();
        self.strip_color_codes(first_line).trim().to_string()
    }

    pub fn extract(&self, page: &RawPage) -> Extraction {
        let mut extraction = Extraction::default();

        for entry in page.auctions.iter().filter(|e| self.includes(e)) {
            let decoded = nbt::decode_payload(&entry.item_bytes);
            if let Err(ref error) = decoded {
                extraction.decode_failures.push(DecodeFailure {
                    uuid: entry.uuid.clone(),
                    item_name: entry.item_name.clone(),
                    error: error.clone(),
                });
            }
            extraction.records.push(self.build(entry, decoded.ok()));
        }

        extraction
    }

    /// Identity used for best-price merging
    ///
    /// Pets all share [`PET_ID`], so they are told apart by species: the
    /// decoded `petInfo.type`, else the display name without its level tag.
    /// Books are told apart by the lore-derived name.
    fn item_id(&self, name: &str, decoded: Option<&DecodedItem>) -> String {
        match decoded.and_then(|item| item.item_id().ok()) {
            Some(PET_ID) => decoded
                .and_then(DecodedItem::pet_type)
                .unwrap_or_else(|| underscored(without_level(name))),
            Some(ENCHANTED_BOOK_ID) => underscored(name),
            Some(id) => id.to_string(),
            None => underscored(name),
        }
    }

    fn build(&self, entry: &RawEntry, decoded: Option<DecodedItem>) -> CanonicalRecord {
        let name = self.display_name(entry);
        let item_id = self.item_id(&name, decoded.as_ref());

        match self.mode {
            ExtractionMode::BestPrice => CanonicalRecord {
                item_id,
                item_name: underscored(&format!("{}_{}", name, entry.tier)),
                tier: entry.tier.clone(),
                starting_bid: entry.starting_bid,
                enchants: None,
                uuid: None,
                auctioneer: None,
                end: None,
            },
            ExtractionMode::FullDetail => CanonicalRecord {
                item_id,
                item_name: name,
                tier: entry.tier.clone(),
                starting_bid: entry.starting_bid,
                enchants: decoded.as_ref().map(DecodedItem::enchantments),
                uuid: Some(entry.uuid.clone()),
                auctioneer: Some(entry.auctioneer.clone()),
                end: Some(entry.end),
            },
        }
    }
}

/// `"Ender Dragon"` -> `"ENDER_DRAGON"`
fn underscored(name: &str) -> String {
    name.replace(' ', "_").to_uppercase()
}

/// `"[Lvl 100] Ender Dragon"` -> `"Ender Dragon"`
fn without_level(name: &str) -> &str {
    match name.strip_prefix("[Lvl ").and_then(|rest| rest.split_once("] ")) {
        Some((_, species)) => species,
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_hint::CacheHint;
    use crate::nbt::{encode, Tag};
    use base64::Engine;

    fn payload(id: &str, enchants: &[(&str, i32)]) -> String {
        let mut extra = vec![("id".to_string(), Tag::string(id))];
        if !enchants.is_empty() {
            extra.push((
                "enchantments".to_string(),
                Tag::compound(enchants.iter().map(|(n, l)| (*n, Tag::Int(*l)))),
            ));
        }
        encoded(extra)
    }

    fn pet_payload(species: &str) -> String {
        let info = format!(r#"{{"type":"{}","active":false,"exp":0.0,"tier":"EPIC"}}"#, species);
        encoded(vec![
            ("id".to_string(), Tag::string(PET_ID)),
            ("petInfo".to_string(), Tag::string(info)),
        ])
    }

    fn encoded(extra: Vec<(String, Tag)>) -> String {
        let root = Tag::compound([(
            "i",
            Tag::List(vec![Tag::compound([(
                "tag",
                Tag::compound([("ExtraAttributes", Tag::Compound(extra))]),
            )])]),
        )]);
        base64::engine::general_purpose::STANDARD.encode(encode("", &root, true))
    }

    fn entry(name: &str, lore: &str, bin: bool, price: f64, bytes: String) -> RawEntry {
        RawEntry {
            uuid: format!("uuid-{}-{}", name, price),
            auctioneer: "seller-1".to_string(),
            end: 1_700_000_000_000,
            item_name: name.to_string(),
            item_lore: lore.to_string(),
            item_bytes: bytes,
            starting_bid: price,
            tier: "LEGENDARY".to_string(),
            bin,
        }
    }

    fn page(auctions: Vec<RawEntry>) -> RawPage {
        RawPage {
            page: 0,
            total_pages: 1,
            auctions,
            cache_hint: CacheHint::default(),
        }
    }

    fn pet_lore() -> String {
        format!("§8Combat Pet\n\n{}!", PET_MARKER)
    }

    #[test]
    fn test_non_bin_listings_are_never_included() {
        let extractor = RecordExtractor::new(ExtractionMode::BestPrice, true).expect("extractor");
        let page = page(vec![
            entry("[Lvl 100] Ender Dragon", &pet_lore(), false, 10.0, payload("PET", &[])),
            entry("[Lvl 100] Ender Dragon", &pet_lore(), true, 20.0, payload("PET", &[])),
        ]);

        let records = extractor.extract(&page).records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].starting_bid, 20.0);
    }

    #[test]
    fn test_pet_filter_requires_marker() {
        let pets = RecordExtractor::new(ExtractionMode::BestPrice, true).expect("extractor");
        let everything = RecordExtractor::new(ExtractionMode::BestPrice, false).expect("extractor");
        let sword = entry("Hyperion", "§7Gear Score: 620", true, 1e9, payload("HYPERION", &[]));

        assert!(!pets.includes(&sword));
        assert!(everything.includes(&sword));
    }

    #[test]
    fn test_best_price_record_shape() {
        let extractor = RecordExtractor::new(ExtractionMode::BestPrice, true).expect("extractor");
        let page = page(vec![entry("Ender Dragon", &pet_lore(), true, 100.0, pet_payload("ENDER_DRAGON"))]);

        let extraction = extractor.extract(&page);
        assert!(extraction.decode_failures.is_empty());
        let record = &extraction.records[0];
        assert_eq!(record.item_id, "ENDER_DRAGON");
        assert_eq!(record.item_name, "ENDER_DRAGON_LEGENDARY");
        assert_eq!(record.tier, "LEGENDARY");
        assert_eq!(record.uuid, None);
        assert_eq!(record.enchants, None);
    }

    #[test]
    fn test_full_detail_keeps_listing_identity_and_enchants() {
        let extractor = RecordExtractor::new(ExtractionMode::FullDetail, false).expect("extractor");
        let page = page(vec![entry(
            "Aspect of the End",
            "",
            true,
            250_000.0,
            payload("ASPECT_OF_THE_END", &[("ultimate_wise", 5), ("sharpness", 6)]),
        )]);

        let record = &extractor.extract(&page).records[0];
        assert_eq!(record.item_id, "ASPECT_OF_THE_END");
        assert_eq!(record.item_name, "Aspect of the End");
        assert_eq!(record.uuid.as_deref(), Some("uuid-Aspect of the End-250000"));
        assert_eq!(record.auctioneer.as_deref(), Some("seller-1"));
        assert_eq!(record.end, Some(1_700_000_000_000));
        assert_eq!(
            record.enchants,
            Some(vec!["ULTIMATE_WISE;5".to_string(), "SHARPNESS;6".to_string()])
        );
    }

    #[test]
    fn test_pet_species_stay_distinct_in_best_price() {
        let extractor = RecordExtractor::new(ExtractionMode::BestPrice, true).expect("extractor");
        let mut listings = vec![
            entry("[Lvl 1] Ender Dragon", &pet_lore(), true, 5_000.0, pet_payload("ENDER_DRAGON")),
            entry("[Lvl 1] Wolf", &pet_lore(), true, 1_000.0, pet_payload("WOLF")),
            entry("[Lvl 100] Wolf", &pet_lore(), true, 900.0, pet_payload("WOLF")),
            entry("[Lvl 1] Golden Dragon", &pet_lore(), true, 2_000.0, payload(PET_ID, &[])),
        ];
        for listing in &mut listings {
            listing.tier = "EPIC".to_string();
        }

        let records = extractor.extract(&page(listings)).records;
        let ids: Vec<&str> = records.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["ENDER_DRAGON", "WOLF", "WOLF", "GOLDEN_DRAGON"]);

        let mut merged: Vec<(String, f64)> = crate::dedup::merge(records, ExtractionMode::BestPrice)
            .into_iter()
            .map(|r| (r.item_id, r.starting_bid))
            .collect();
        merged.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            merged,
            vec![
                ("ENDER_DRAGON".to_string(), 5_000.0),
                ("GOLDEN_DRAGON".to_string(), 2_000.0),
                ("WOLF".to_string(), 900.0),
            ]
        );
    }

    #[test]
    fn test_enchanted_book_named_from_lore() {
        let extractor = RecordExtractor::new(ExtractionMode::FullDetail, false).expect("extractor");
        let book = entry(
            ENCHANTED_BOOK,
            "§9Telekinesis I\n§7Causes drops to go directly\n§7into your inventory.",
            true,
            100.0,
            payload("ENCHANTED_BOOK", &[("telekinesis", 1)]),
        );

        let record = &extractor.extract(&page(vec![book])).records[0];
        assert_eq!(record.item_name, "Telekinesis I");
        assert_ne!(record.item_name, ENCHANTED_BOOK);
    }

    #[test]
    fn test_enchanted_book_named_from_lore_in_best_price() {
        let extractor = RecordExtractor::new(ExtractionMode::BestPrice, false).expect("extractor");
        let books = vec![
            entry(
                ENCHANTED_BOOK,
                "§9§lUltimate Wise V\n§7Reduces the ability mana cost",
                true,
                3_000_000.0,
                payload(ENCHANTED_BOOK_ID, &[("ultimate_wise", 5)]),
            ),
            entry(
                ENCHANTED_BOOK,
                "§9Telekinesis I\n§7Causes drops to go directly",
                true,
                100.0,
                payload(ENCHANTED_BOOK_ID, &[("telekinesis", 1)]),
            ),
        ];

        let records = extractor.extract(&page(books)).records;
        let names: Vec<&str> = records.iter().map(|r| r.item_name.as_str()).collect();
        assert_eq!(names, vec!["ULTIMATE_WISE_V_LEGENDARY", "TELEKINESIS_I_LEGENDARY"]);
        for record in &records {
            assert_ne!(record.item_name, ENCHANTED_BOOK);
            assert_ne!(record.item_name, "ENCHANTED_BOOK_LEGENDARY");
        }

        // distinct enchantments never collapse into one book
        let merged = crate::dedup::merge(records, ExtractionMode::BestPrice);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_strip_color_codes_is_case_insensitive() {
        let extractor = RecordExtractor::new(ExtractionMode::FullDetail, false).expect("extractor");
        assert_eq!(extractor.strip_color_codes("§d§lMEGA §kx§r Sharpness VII"), "MEGA x Sharpness VII");
        assert_eq!(extractor.strip_color_codes("§Z stays"), "§Z stays");
    }

    #[test]
    fn test_corrupt_payload_is_isolated() {
        let extractor = RecordExtractor::new(ExtractionMode::FullDetail, false).expect("extractor");
        let page = page(vec![
            entry("Bonzo Staff", "", true, 1.0, payload("BONZO_STAFF", &[])),
            entry("Broken Item", "", true, 2.0, "H4sIAAAAAAAA/////w==".to_string()),
            entry("Juju Shortbow", "", true, 3.0, payload("JUJU_SHORTBOW", &[])),
        ]);

        let extraction = extractor.extract(&page);
        assert_eq!(extraction.records.len(), 3);
        assert_eq!(extraction.decode_failures.len(), 1);
        assert_eq!(extraction.decode_failures[0].item_name, "Broken Item");

        let broken = &extraction.records[1];
        assert_eq!(broken.item_id, "BROKEN_ITEM");
        assert_eq!(broken.enchants, None);
        assert_eq!(extraction.records[2].item_id, "JUJU_SHORTBOW");
    }
}
