// src/models/stats.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{PageUrl, ScopeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    ScopeCreated,
    ScopeUpdated,
    ScopeDeleted,
    PageAdded,
    CrawlCompleted,
    CrawlFailed,
}

/// An entry in the recent activity feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// A recently enqueued crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedCrawl {
    pub url: PageUrl,
    pub scope: String,
}

/// Freshness summary for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeFreshness {
    pub scope_id: ScopeId,
    pub name: String,
    pub pages: usize,
    pub stale_pages: usize,
    /// Mean freshness over member pages; 0 for an empty scope
    pub mean_freshness: f64,
}

/// Point-in-time system statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_scopes: usize,
    pub total_pages: usize,
    pub active_crawls: usize,
    pub pending_crawls: usize,
    pub recent_activity: Vec<ActivityEvent>,
    pub crawl_queue: Vec<QueuedCrawl>,
    pub freshness: Vec<ScopeFreshness>,
}
