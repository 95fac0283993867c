//! External collaborators: the crawl frontier and the retrieval backend.
//!
//! Both are reached over HTTP in production. The traits are the seam the
//! coordinator and the query orchestrator depend on, so either side can be
//! swapped for an in-process implementation.

pub mod frontier;
pub mod retrieval;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{PageUrl, RetrievalHit, RetrievalRequest, ScopeId};

pub use frontier::HttpFrontierClient;
pub use retrieval::HttpRetrievalClient;

/// Metadata sent with every frontier submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlMetadata {
    /// Scopes interested in the page
    pub scope_ids: Vec<ScopeId>,
    /// Stable per job, so a retried submit can be deduplicated downstream
    pub idempotency_key: String,
}

/// Accepts URLs for fetching.
#[async_trait]
pub trait FrontierClient: Send + Sync {
    /// Hand a URL to the frontier. Ok means the frontier accepted it.
    async fn submit(&self, url: &PageUrl, metadata: &CrawlMetadata) -> Result<()>;
}

/// Answers text queries restricted to an allow-list of URLs.
#[async_trait]
pub trait RetrievalClient: Send + Sync {
    async fn search(&self, request: &RetrievalRequest) -> Result<Vec<RetrievalHit>>;
}
