//! Upstream cache metadata and the adaptive wait derived from it
//!
//! The catalog is served from a shared cache that refreshes at most once per
//! `s-maxage` seconds. Waiting until just past that boundary avoids both
//! fetching the same snapshot twice and lagging behind a fresh one.

use reqwest::header::{HeaderMap, AGE, CACHE_CONTROL};
use serde::Serialize;
use std::time::Duration;

/// Cache lifetime assumed when `Cache-Control` carries no usable `s-maxage`.
pub const DEFAULT_MAX_AGE_SECS: i64 = 60;

/// Wait used when the computed value is unusable.
pub const FALLBACK_WAIT_SECS: u64 = 50;

/// Added past the refresh boundary so the next fetch sees the new snapshot.
pub const SAFETY_MARGIN_SECS: i64 = 2;

/// State of the `Age` response header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheAge {
    Missing,
    Unparseable,
    Seconds(i64),
}

/// Cache metadata read from one upstream response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheHint {
    pub age: CacheAge,
    pub max_age_secs: i64,
}

impl Default for CacheHint {
    fn default() -> Self {
        Self {
            age: CacheAge::Missing,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
        }
    }
}

impl CacheHint {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let age = headers.get(AGE).map(|v| v.to_str().unwrap_or(""));
        let cache_control = headers.get(CACHE_CONTROL).and_then(|v| v.to_str().ok());
        Self::from_values(age, cache_control)
    }

    /// Build from raw header values (`None` = header absent)
    pub fn from_values(age: Option<&str>, cache_control: Option<&str>) -> Self {
        let age = match age {
            None => CacheAge::Missing,
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map(CacheAge::Seconds)
                .unwrap_or(CacheAge::Unparseable),
        };

        let max_age_secs = cache_control
            .and_then(parse_s_maxage)
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_MAX_AGE_SECS);

        Self { age, max_age_secs }
    }

    /// The same hint observed `elapsed` later
    pub fn aged(self, elapsed: Duration) -> Self {
        let age = match self.age {
            CacheAge::Seconds(secs) => {
                CacheAge::Seconds(secs.saturating_add(elapsed.as_secs() as i64))
            },
            other => other,
        };
        Self { age, ..self }
    }

    /// Seconds to wait before the next cycle
    pub fn wait_secs(&self) -> u64 {
        match self.age {
            CacheAge::Missing => 0,
            CacheAge::Unparseable => FALLBACK_WAIT_SECS,
            CacheAge::Seconds(age) => {
                let wait = self.max_age_secs - age + SAFETY_MARGIN_SECS;
                if wait > 0 {
                    wait as u64
                } else {
                    FALLBACK_WAIT_SECS
                }
            },
        }
    }

    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs())
    }
}

/// Extract `s-maxage=<int>` from a `Cache-Control` value
fn parse_s_maxage(cache_control: &str) -> Option<i64> {
    cache_control.split(',').find_map(|directive| {
        let (name, value) = directive.trim().split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("s-maxage") {
            return None;
        }
        value.trim().trim_matches('"').parse().ok()
    })
}
