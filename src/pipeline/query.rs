//! Scoped query orchestration.
//!
//! A query names scopes; the orchestrator resolves them to the union of their
//! member pages and hands that URL allow-list to the retrieval backend. Hits
//! outside the allow-list are dropped here as well, so an out-of-scope result
//! can never leak even if the backend ignores the filter.
//!
//! Ranking blends backend relevance with page freshness:
//!
//! > score = relevance_weight * relevance + freshness_weight * freshness
//!
//! When the backend fails or times out, the response is flagged `degraded`
//! and lists in-scope pages by freshness alone, with no relevance values.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use unicode_segmentation::UnicodeSegmentation;

use crate::clients::RetrievalClient;
use crate::error::{AppError, Result};
use crate::models::{
    PageUrl, QueryRequest, QueryResponse, RankedResult, RankingConfig, RetrievalConfig,
    RetrievalHit, RetrievalRequest, ScopeId,
};
use crate::pipeline::freshness::FreshnessTracker;
use crate::storage::{ScopeStore, ScopedPage};

pub struct QueryOrchestrator {
    scopes: Arc<ScopeStore>,
    freshness: Arc<FreshnessTracker>,
    retrieval: Arc<dyn RetrievalClient>,
    retrieval_config: RetrievalConfig,
    ranking: RankingConfig,
}

impl QueryOrchestrator {
    pub fn new(
        scopes: Arc<ScopeStore>,
        freshness: Arc<FreshnessTracker>,
        retrieval: Arc<dyn RetrievalClient>,
        retrieval_config: RetrievalConfig,
        ranking: RankingConfig,
    ) -> Self {
        Self {
            scopes,
            freshness,
            retrieval,
            retrieval_config,
            ranking,
        }
    }

    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        self.query_at(request, Utc::now()).await
    }

    /// Run a query, scoring freshness as of `now`.
    pub async fn query_at(&self, request: &QueryRequest, now: DateTime<Utc>) -> Result<QueryResponse> {
        let text = request.text.trim();
        if text.is_empty() {
            return Err(AppError::validation("query text must not be empty"));
        }
        let scope_ids = self.validate_scopes(&request.scopes)?;

        let pages = self.scopes.pages_in_scopes(&scope_ids);
        let mut response = QueryResponse {
            query: text.to_string(),
            scopes: scope_ids,
            results: Vec::new(),
            degraded: false,
            degraded_reason: None,
        };
        if pages.is_empty() {
            log::debug!("Query '{}' has no pages in scope", text);
            return Ok(response);
        }

        let retrieval_request = RetrievalRequest {
            query: text.to_string(),
            mode: self.retrieval_config.mode,
            allowed_urls: pages.iter().map(|p| p.url.clone()).collect(),
            top_k: self.retrieval_config.top_k,
        };

        let timeout = self.retrieval_config.timeout();
        let outcome = match tokio::time::timeout(timeout, self.retrieval.search(&retrieval_request)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::collaborator(
                "retrieval",
                format!("timed out after {} ms", timeout.as_millis()),
            )),
        };

        match outcome {
            Ok(hits) => {
                response.results = self.rank(hits, &pages, now);
            }
            Err(e) => {
                log::warn!("Serving degraded results for '{}': {}", text, e);
                response.results = self.rank_by_freshness(&pages, now);
                response.degraded = true;
                response.degraded_reason = Some(e.to_string());
            }
        }
        Ok(response)
    }

    /// Every id must exist; duplicates collapse, first occurrence wins.
    fn validate_scopes(&self, ids: &[ScopeId]) -> Result<Vec<ScopeId>> {
        if ids.is_empty() {
            return Err(AppError::validation("query must name at least one scope"));
        }
        let mut unique = Vec::with_capacity(ids.len());
        for id in ids {
            if !self.scopes.contains(*id) {
                return Err(AppError::validation(format!("unknown scope id: {id}")));
            }
            if !unique.contains(id) {
                unique.push(*id);
            }
        }
        Ok(unique)
    }

    fn rank(&self, hits: Vec<RetrievalHit>, pages: &[ScopedPage], now: DateTime<Utc>) -> Vec<RankedResult> {
        let allowed: HashMap<&PageUrl, &ScopedPage> = pages.iter().map(|p| (&p.url, p)).collect();

        // Best hit per page
        let mut best: HashMap<PageUrl, RetrievalHit> = HashMap::new();
        let mut dropped = 0usize;
        for hit in hits {
            let Ok(url) = PageUrl::parse(&hit.url) else {
                dropped += 1;
                continue;
            };
            if !allowed.contains_key(&url) {
                dropped += 1;
                continue;
            }
            match best.get(&url) {
                Some(existing) if existing.relevance >= hit.relevance => {}
                _ => {
                    best.insert(url, hit);
                }
            }
        }
        if dropped > 0 {
            log::debug!("Dropped {} out-of-scope or malformed hits", dropped);
        }

        let mut results: Vec<RankedResult> = best
            .into_iter()
            .filter_map(|(url, hit)| {
                let page = allowed.get(&url)?;
                let relevance = clamp_unit(hit.relevance);
                let freshness = self.freshness.score(url.as_str(), now);
                Some(RankedResult {
                    title: hit.title.or_else(|| page.title.clone()),
                    snippet: self.trim_snippet(&hit.snippet),
                    relevance: Some(relevance),
                    freshness,
                    score: self.ranking.relevance_weight * relevance
                        + self.ranking.freshness_weight * freshness,
                    scopes: page.scopes.clone(),
                    url,
                })
            })
            .collect();

        sort_ranked(&mut results);
        results.truncate(self.ranking.max_results);
        results
    }

    fn rank_by_freshness(&self, pages: &[ScopedPage], now: DateTime<Utc>) -> Vec<RankedResult> {
        let mut results: Vec<RankedResult> = pages
            .iter()
            .map(|page| {
                let freshness = self.freshness.score(page.url.as_str(), now);
                RankedResult {
                    url: page.url.clone(),
                    title: page.title.clone(),
                    snippet: None,
                    relevance: None,
                    freshness,
                    score: freshness,
                    scopes: page.scopes.clone(),
                }
            })
            .collect();

        sort_ranked(&mut results);
        results.truncate(self.ranking.max_results);
        results
    }

    fn trim_snippet(&self, snippet: &str) -> Option<String> {
        let snippet = snippet.trim();
        if snippet.is_empty() {
            return None;
        }
        let max = self.ranking.snippet_max_chars;
        if snippet.graphemes(true).count() <= max {
            return Some(snippet.to_string());
        }
        let mut trimmed: String = snippet.graphemes(true).take(max).collect();
        trimmed.push('…');
        Some(trimmed)
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Highest score first; URL breaks ties so output is deterministic.
fn sort_ranked(results: &mut [RankedResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.url.cmp(&b.url))
    });
}
