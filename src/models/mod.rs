// src/models/mod.rs

//! Domain models for the scope coordinator.
//!
//! This module contains all data structures used throughout the crate,
//! organized by their primary purpose.

mod config;
mod job;
mod page;
mod query;
mod scope;
mod seed;
mod stats;

// Re-export all public types
pub use config::{
    ActivityConfig, Config, CoordinatorConfig, FRONTIER_URL_ENV, FreshnessConfig, FrontierConfig,
    HttpConfig, LoggingConfig, RETRIEVAL_URL_ENV, RankingConfig, RetrievalConfig, RetryConfig,
};
pub use job::{JobId, JobProgress, JobReport, JobState};
pub use page::{NewPage, Page, PageUrl};
pub use query::{
    QueryRequest, QueryResponse, RankedResult, RetrievalHit, RetrievalMode, RetrievalRequest,
};
pub use scope::{NewScope, Patch, Scope, ScopeId, ScopePatch};
pub use seed::{Seed, SeedScope};
pub use stats::{ActivityEvent, ActivityKind, QueuedCrawl, ScopeFreshness, Stats};
