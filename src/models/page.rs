// src/models/page.rs

//! Page model: a canonical URL and its scope membership.

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::ScopeId;
use crate::utils::url::normalize;

/// Normalized page URL, the identity of a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PageUrl(String);

impl PageUrl {
    /// Normalize and wrap a raw URL.
    pub fn parse(raw: &str) -> Result<Self> {
        normalize(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PageUrl {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PageUrl::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for PageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PageUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PageUrl {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Request to attach a page to a scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPage {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_trigger_crawl")]
    pub trigger_crawl: bool,
}

fn default_trigger_crawl() -> bool {
    true
}

impl NewPage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            trigger_crawl: true,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn without_crawl(mut self) -> Self {
        self.trigger_crawl = false;
        self
    }
}

/// Read view of a known page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub url: PageUrl,
    pub title: Option<String>,
    /// Scopes matching by pattern or by explicit attachment
    pub scopes: Vec<ScopeId>,
    /// None means never crawled
    pub last_crawled: Option<DateTime<Utc>>,
    /// Freshness in [0, 1] at the time the view was built
    pub freshness: f64,
}
