//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::RetrievalMode;

/// Environment variable overriding `frontier.base_url`.
pub const FRONTIER_URL_ENV: &str = "FRONTIER_URL";
/// Environment variable overriding `retrieval.base_url`.
pub const RETRIEVAL_URL_ENV: &str = "LIGHTRAG_URL";

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Shared HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Frontier (crawl queue) collaborator
    #[serde(default)]
    pub frontier: FrontierConfig,

    /// Retrieval (RAG backend) collaborator
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Crawl job dispatch and retry behavior
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Freshness decay and re-crawl eligibility
    #[serde(default)]
    pub freshness: FreshnessConfig,

    /// Query result blending
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Recent activity feed
    #[serde(default)]
    pub activity: ActivityConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply collaborator endpoint overrides from the environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(FRONTIER_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.frontier.base_url = url;
        }
        if let Some(url) = lookup(RETRIEVAL_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.retrieval.base_url = url;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.frontier.base_url.trim().is_empty() {
            return Err(AppError::validation("frontier.base_url is empty"));
        }
        if self.frontier.timeout_ms == 0 {
            return Err(AppError::validation("frontier.timeout_ms must be > 0"));
        }
        if self.retrieval.base_url.trim().is_empty() {
            return Err(AppError::validation("retrieval.base_url is empty"));
        }
        if self.retrieval.timeout_ms == 0 {
            return Err(AppError::validation("retrieval.timeout_ms must be > 0"));
        }
        self.coordinator.validate()?;
        self.freshness.validate()?;
        self.ranking.validate()?;
        Ok(())
    }
}

/// Shared HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for collaborator requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Outer request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Frontier collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierConfig {
    #[serde(default = "defaults::frontier_url")]
    pub base_url: String,

    /// Timeout for a single submit call
    #[serde(default = "defaults::frontier_timeout")]
    pub timeout_ms: u64,
}

impl FrontierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::frontier_url(),
            timeout_ms: defaults::frontier_timeout(),
        }
    }
}

/// Retrieval collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "defaults::retrieval_url")]
    pub base_url: String,

    /// Timeout for a single search call
    #[serde(default = "defaults::retrieval_timeout")]
    pub timeout_ms: u64,

    /// Retrieval strategy requested from the backend
    #[serde(default)]
    pub mode: RetrievalMode,

    /// Number of hits requested from the backend
    #[serde(default = "defaults::top_k")]
    pub top_k: usize,
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::retrieval_url(),
            timeout_ms: defaults::retrieval_timeout(),
            mode: RetrievalMode::default(),
            top_k: defaults::top_k(),
        }
    }
}

/// Crawl dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Number of dispatch workers (maximum in-flight submits)
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Queued jobs allowed before `enqueue` reports backpressure
    #[serde(default = "defaults::high_water_mark")]
    pub high_water_mark: usize,

    /// Terminal job reports retained for inspection
    #[serde(default = "defaults::history_capacity")]
    pub history_capacity: usize,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl CoordinatorConfig {
    fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(AppError::validation("coordinator.max_concurrent must be > 0"));
        }
        if self.high_water_mark == 0 {
            return Err(AppError::validation(
                "coordinator.high_water_mark must be > 0",
            ));
        }
        self.retry.validate()
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
            high_water_mark: defaults::high_water_mark(),
            history_capacity: defaults::history_capacity(),
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff for failed frontier submits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    #[serde(default = "defaults::base_delay")]
    pub base_delay_ms: u64,

    /// Multiplier applied per retry
    #[serde(default = "defaults::backoff_factor")]
    pub factor: f64,

    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,

    /// Fractional jitter in [0, 1]; 0.2 spreads each delay by +/-20%
    #[serde(default = "defaults::jitter")]
    pub jitter: f64,
}

impl RetryConfig {
    fn validate(&self) -> Result<()> {
        if !(self.factor >= 1.0) {
            return Err(AppError::validation("coordinator.retry.factor must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(AppError::validation(
                "coordinator.retry.jitter must be within [0, 1]",
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(AppError::validation(
                "coordinator.retry.max_delay_ms must be >= base_delay_ms",
            ));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            base_delay_ms: defaults::base_delay(),
            factor: defaults::backoff_factor(),
            max_delay_ms: defaults::max_delay(),
            jitter: defaults::jitter(),
        }
    }
}

/// Freshness decay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessConfig {
    /// Decay constant in seconds: score = exp(-elapsed / half_life_secs)
    #[serde(default = "defaults::half_life")]
    pub half_life_secs: u64,

    /// Pages scoring below this are stale and eligible for re-crawl
    #[serde(default = "defaults::stale_threshold")]
    pub stale_threshold: f64,

    /// Auto-track refresh period; 0 disables the background refresher
    #[serde(default = "defaults::refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl FreshnessConfig {
    fn validate(&self) -> Result<()> {
        if self.half_life_secs == 0 {
            return Err(AppError::validation("freshness.half_life_secs must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.stale_threshold) {
            return Err(AppError::validation(
                "freshness.stale_threshold must be within [0, 1]",
            ));
        }
        Ok(())
    }
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            half_life_secs: defaults::half_life(),
            stale_threshold: defaults::stale_threshold(),
            refresh_interval_secs: defaults::refresh_interval(),
        }
    }
}

/// Query ranking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "defaults::relevance_weight")]
    pub relevance_weight: f64,

    #[serde(default = "defaults::freshness_weight")]
    pub freshness_weight: f64,

    /// Maximum results returned per query
    #[serde(default = "defaults::max_results")]
    pub max_results: usize,

    /// Snippets are cut to this many grapheme clusters
    #[serde(default = "defaults::snippet_max_chars")]
    pub snippet_max_chars: usize,
}

impl RankingConfig {
    fn validate(&self) -> Result<()> {
        if self.relevance_weight < 0.0 || self.freshness_weight < 0.0 {
            return Err(AppError::validation("ranking weights must be non-negative"));
        }
        if self.relevance_weight + self.freshness_weight <= 0.0 {
            return Err(AppError::validation("ranking weights must not both be zero"));
        }
        if self.max_results == 0 {
            return Err(AppError::validation("ranking.max_results must be > 0"));
        }
        Ok(())
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            relevance_weight: defaults::relevance_weight(),
            freshness_weight: defaults::freshness_weight(),
            max_results: defaults::max_results(),
            snippet_max_chars: defaults::snippet_max_chars(),
        }
    }
}

/// Recent activity feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    #[serde(default = "defaults::activity_capacity")]
    pub capacity: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::activity_capacity(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; owlscope/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Collaborator defaults
    pub fn frontier_url() -> String {
        "http://frontier:7072".into()
    }
    pub fn frontier_timeout() -> u64 {
        5_000
    }
    pub fn retrieval_url() -> String {
        "http://lightrag:9621".into()
    }
    pub fn retrieval_timeout() -> u64 {
        10_000
    }
    pub fn top_k() -> usize {
        20
    }

    // Coordinator defaults
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn high_water_mark() -> usize {
        1_000
    }
    pub fn history_capacity() -> usize {
        100
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn base_delay() -> u64 {
        500
    }
    pub fn backoff_factor() -> f64 {
        2.0
    }
    pub fn max_delay() -> u64 {
        30_000
    }
    pub fn jitter() -> f64 {
        0.2
    }

    // Freshness defaults
    pub fn half_life() -> u64 {
        7 * 24 * 60 * 60
    }
    pub fn stale_threshold() -> f64 {
        0.5
    }
    pub fn refresh_interval() -> u64 {
        0
    }

    // Ranking defaults
    pub fn relevance_weight() -> f64 {
        0.8
    }
    pub fn freshness_weight() -> f64 {
        0.2
    }
    pub fn max_results() -> usize {
        10
    }
    pub fn snippet_max_chars() -> usize {
        280
    }

    pub fn activity_capacity() -> usize {
        20
    }
    pub fn log_level() -> String {
        "info".into()
    }
}
