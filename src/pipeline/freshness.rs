//! Freshness tracking.
//!
//! Per-page crawl timestamps keyed by normalized URL, shared by every scope
//! matching that URL. Freshness decays exponentially with time since the last
//! crawl:
//!
//! > score = exp(-elapsed / half_life), clamped to [0, 1]; never crawled = 0
//!
//! Reads and writes lock only the shard holding the URL, so lookups for
//! unrelated pages never wait on a crawl completion.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::models::{FreshnessConfig, PageUrl};

/// Crawl history of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessEntry {
    pub last_crawled: DateTime<Utc>,
    pub crawl_count: u64,
}

/// Tracks crawl recency for every known page.
#[derive(Debug)]
pub struct FreshnessTracker {
    entries: DashMap<PageUrl, FreshnessEntry>,
    half_life_secs: f64,
}

impl FreshnessTracker {
    pub fn new(config: &FreshnessConfig) -> Self {
        Self::with_half_life(Duration::from_secs(config.half_life_secs))
    }

    pub fn with_half_life(half_life: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            // Guard against a zero constant turning every score into NaN
            half_life_secs: half_life.as_secs_f64().max(f64::EPSILON),
        }
    }

    /// Record a completed crawl. An older timestamp never overwrites a newer one.
    pub fn record_crawl(&self, url: &PageUrl, at: DateTime<Utc>) {
        self.entries
            .entry(url.clone())
            .and_modify(|entry| {
                entry.last_crawled = entry.last_crawled.max(at);
                entry.crawl_count += 1;
            })
            .or_insert(FreshnessEntry {
                last_crawled: at,
                crawl_count: 1,
            });
    }

    /// Freshness in [0, 1]; 0 for a page never crawled.
    pub fn score(&self, url: &str, now: DateTime<Utc>) -> f64 {
        match self.entries.get(url) {
            Some(entry) => self.decay(entry.last_crawled, now),
            None => 0.0,
        }
    }

    /// True when the score is below `threshold`.
    pub fn is_stale(&self, url: &str, now: DateTime<Utc>, threshold: f64) -> bool {
        self.score(url, now) < threshold
    }

    pub fn last_crawled(&self, url: &str) -> Option<DateTime<Utc>> {
        self.entries.get(url).map(|entry| entry.last_crawled)
    }

    pub fn entry(&self, url: &str) -> Option<FreshnessEntry> {
        self.entries.get(url).map(|entry| *entry)
    }

    /// Drop all state for a page that no scope owns anymore.
    pub fn forget(&self, url: &str) -> bool {
        self.entries.remove(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn decay(&self, last_crawled: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        // A crawl stamped after `now` (clock skew) counts as just crawled
        let elapsed_ms = (now - last_crawled).num_milliseconds().max(0);
        let elapsed = elapsed_ms as f64 / 1000.0;
        (-elapsed / self.half_life_secs).exp().clamp(0.0, 1.0)
    }
}
