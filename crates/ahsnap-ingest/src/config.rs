//! Ingestion configuration
//!
//! Values come from `AHSNAP_*` environment variables (a `.env` file is
//! honoured by the binaries); anything unset falls back to the defaults below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::ExtractionMode;
use crate::snapshot::ReplaceStrategy;

// ============================================================================
// Ingestion Configuration Constants
// ============================================================================

/// Default upstream base URL; pages are read from `{url}/auctions?page=N`.
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.hypixel.net/skyblock";

/// Default upper bound on concurrent page fetches.
pub const DEFAULT_MAX_IN_FLIGHT: usize = crate::orchestrator::DEFAULT_MAX_IN_FLIGHT;

/// Default per-fetch timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Default idle floor between cycles in seconds (none).
pub const DEFAULT_MIN_IDLE_SECS: u64 = 0;

/// Username attached to webhook notifications.
pub const DEFAULT_WEBHOOK_USERNAME: &str = "ahsnap";

/// Ingestion pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub upstream_url: String,
    pub mode: ExtractionMode,
    /// Restrict ingestion to companion pets; unset follows the mode
    pub pet_filter: Option<bool>,
    pub max_in_flight: usize,
    pub fetch_timeout_secs: u64,
    pub min_idle_secs: u64,
    pub replace_strategy: ReplaceStrategy,
    /// Mirror the snapshot to this JSON file
    pub snapshot_path: Option<PathBuf>,
    pub webhook_url: Option<String>,
    /// PostgreSQL snapshot storage (feature `database`)
    pub database_url: Option<String>,
}

impl IngestConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode: ExtractionMode = match var("AHSNAP_MODE") {
            Some(raw) => raw
                .parse()
                .map_err(|e: String| anyhow::anyhow!("AHSNAP_MODE: {}", e))?,
            None => ExtractionMode::default(),
        };

        let replace_strategy: ReplaceStrategy = match var("AHSNAP_REPLACE_STRATEGY") {
            Some(raw) => raw
                .parse()
                .map_err(|e: String| anyhow::anyhow!("AHSNAP_REPLACE_STRATEGY: {}", e))?,
            None => ReplaceStrategy::default(),
        };

        let config = Self {
            upstream_url: var("AHSNAP_UPSTREAM_URL")
                .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string()),
            mode,
            pet_filter: var("AHSNAP_PET_FILTER").and_then(|s| parse_bool(&s)),
            max_in_flight: var("AHSNAP_MAX_IN_FLIGHT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_IN_FLIGHT),
            fetch_timeout_secs: var("AHSNAP_FETCH_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
            min_idle_secs: var("AHSNAP_MIN_IDLE_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MIN_IDLE_SECS),
            replace_strategy,
            snapshot_path: var("AHSNAP_SNAPSHOT_PATH").map(PathBuf::from),
            webhook_url: var("AHSNAP_WEBHOOK_URL"),
            database_url: var("DATABASE_URL"),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.upstream_url.starts_with("http://") && !self.upstream_url.starts_with("https://") {
            anyhow::bail!("Upstream URL must be http(s), got '{}'", self.upstream_url);
        }

        if self.max_in_flight == 0 {
            anyhow::bail!("max_in_flight must be greater than 0");
        }

        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("Fetch timeout must be greater than 0");
        }

        if self.mode == ExtractionMode::FullDetail && self.pet_filter() {
            tracing::warn!("Pet filter enabled in full_detail mode - only pets will be stored");
        }

        Ok(())
    }

    /// Effective pet filter: explicit setting, else on in best-price mode only
    pub fn pet_filter(&self) -> bool {
        self.pet_filter
            .unwrap_or(self.mode == ExtractionMode::BestPrice)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn min_idle(&self) -> Duration {
        Duration::from_secs(self.min_idle_secs)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            mode: ExtractionMode::BestPrice,
            pet_filter: None,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            min_idle_secs: DEFAULT_MIN_IDLE_SECS,
            replace_strategy: ReplaceStrategy::Swap,
            snapshot_path: None,
            webhook_url: None,
            database_url: None,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<IngestConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        IngestConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.upstream_url, DEFAULT_UPSTREAM_URL);
        assert_eq!(config.mode, ExtractionMode::BestPrice);
        assert!(config.pet_filter());
        assert_eq!(config.max_in_flight, 16);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.min_idle(), Duration::ZERO);
        assert_eq!(config.replace_strategy, ReplaceStrategy::Swap);
        assert!(config.snapshot_path.is_none());
    }

    #[test]
    fn test_full_detail_disables_pet_filter_by_default() {
        let config = load(&[("AHSNAP_MODE", "full_detail")]).unwrap();
        assert_eq!(config.mode, ExtractionMode::FullDetail);
        assert!(!config.pet_filter());

        let config = load(&[("AHSNAP_MODE", "full-detail"), ("AHSNAP_PET_FILTER", "true")]).unwrap();
        assert!(config.pet_filter());
    }

    #[test]
    fn test_pet_filter_default_follows_later_mode_change() {
        let mut config = load(&[]).unwrap();
        assert!(config.pet_filter());

        config.mode = ExtractionMode::FullDetail;
        assert!(!config.pet_filter());

        let mut config = load(&[("AHSNAP_PET_FILTER", "yes")]).unwrap();
        config.mode = ExtractionMode::FullDetail;
        assert!(config.pet_filter());

        config.pet_filter = Some(false);
        config.mode = ExtractionMode::BestPrice;
        assert!(!config.pet_filter());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("AHSNAP_UPSTREAM_URL", "http://localhost:9000/skyblock"),
            ("AHSNAP_MAX_IN_FLIGHT", "4"),
            ("AHSNAP_MIN_IDLE_SECS", "240"),
            ("AHSNAP_REPLACE_STRATEGY", "merge_by_key"),
            ("AHSNAP_SNAPSHOT_PATH", "/var/lib/ahsnap/snapshot.json"),
        ])
        .unwrap();

        assert_eq!(config.max_in_flight, 4);
        assert_eq!(config.min_idle(), Duration::from_secs(240));
        assert_eq!(config.replace_strategy, ReplaceStrategy::MergeByKey);
        assert_eq!(
            config.snapshot_path,
            Some(PathBuf::from("/var/lib/ahsnap/snapshot.json"))
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(load(&[("AHSNAP_MODE", "cheapest")]).is_err());
        assert!(load(&[("AHSNAP_REPLACE_STRATEGY", "append")]).is_err());
        assert!(load(&[("AHSNAP_MAX_IN_FLIGHT", "0")]).is_err());
        assert!(load(&[("AHSNAP_UPSTREAM_URL", "ftp://example.org")]).is_err());
    }

    #[test]
    fn test_blank_values_fall_back() {
        let config = load(&[("AHSNAP_WEBHOOK_URL", "  "), ("AHSNAP_FETCH_TIMEOUT_SECS", "abc")]).unwrap();
        assert!(config.webhook_url.is_none());
        assert_eq!(config.fetch_timeout_secs, DEFAULT_FETCH_TIMEOUT_SECS);
    }
}
