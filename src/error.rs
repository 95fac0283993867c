// src/error.rs

//! Unified error handling for the scope coordinator.

use std::fmt;

use thiserror::Error;

use crate::models::ScopeId;

/// Result type alias for coordinator operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Unknown scope id
    #[error("Scope not found: {0}")]
    NotFound(ScopeId),

    /// Malformed input or invalid scope reference
    #[error("Validation error: {0}")]
    Validation(String),

    /// Crawl queue is at its high-water mark
    #[error("Crawl queue saturated ({queued} queued, high-water mark {high_water})")]
    Backpressure { queued: usize, high_water: usize },

    /// Frontier or retrieval service unreachable, failing, or timed out
    #[error("{service} unavailable: {message}")]
    CollaboratorUnavailable { service: String, message: String },

    /// Crawl job failed after the configured number of attempts
    #[error("Crawl of {url} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// Coordinator stopped before the job reached a terminal state
    #[error("Coordinator is shutting down")]
    ShuttingDown,

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a collaborator failure for the named service.
    pub fn collaborator(service: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::CollaboratorUnavailable {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Whether the crawl retry loop should try again after this error.
    ///
    /// Only collaborator failures are transient; caller errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CollaboratorUnavailable { .. } | Self::Http(_))
    }
}
