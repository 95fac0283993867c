//! Core pipeline stages.
//!
//! - `matcher`: URL pattern matching for scope membership
//! - `freshness`: per-page crawl recency and decay scoring
//! - `backoff`: retry delays for frontier submits
//! - `coordinator`: deduplicating crawl scheduler
//! - `query`: scoped retrieval and ranking

pub mod backoff;
pub mod coordinator;
pub mod freshness;
pub mod matcher;
pub mod query;

pub use backoff::RetryPolicy;
pub use coordinator::{CrawlCoordinator, FinishHook, JobHandle};
pub use freshness::{FreshnessEntry, FreshnessTracker};
pub use matcher::{Pattern, PatternSet, matches, matches_any};
pub use query::QueryOrchestrator;
