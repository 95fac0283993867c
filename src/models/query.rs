// src/models/query.rs

//! Scoped query request and ranked response types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{PageUrl, ScopeId};

/// Retrieval strategy passed through to the retrieval backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Naive,
    Local,
    Global,
    #[default]
    Hybrid,
}

impl RetrievalMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RetrievalMode::Naive => "naive",
            RetrievalMode::Local => "local",
            RetrievalMode::Global => "global",
            RetrievalMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transient query: text plus the scopes to search within.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    pub scopes: Vec<ScopeId>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>, scopes: impl Into<Vec<ScopeId>>) -> Self {
        Self {
            text: text.into(),
            scopes: scopes.into(),
        }
    }
}

/// What the retrieval backend is asked for.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalRequest {
    pub query: String,
    pub mode: RetrievalMode,
    /// Only these URLs may be returned
    pub allowed_urls: Vec<PageUrl>,
    pub top_k: usize,
}

/// One hit from the retrieval backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub snippet: String,
    #[serde(alias = "score")]
    pub relevance: f64,
}

/// A result after scope filtering and freshness blending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub url: PageUrl,
    pub title: Option<String>,
    pub snippet: Option<String>,
    /// Backend relevance; None when the backend did not answer
    pub relevance: Option<f64>,
    pub freshness: f64,
    /// Blended ranking score
    pub score: f64,
    /// Requested scopes this page belongs to
    pub scopes: Vec<ScopeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub scopes: Vec<ScopeId>,
    pub results: Vec<RankedResult>,
    /// Produced without the retrieval backend
    pub degraded: bool,
    pub degraded_reason: Option<String>,
}
