// src/models/job.rs

//! Crawl job identity, lifecycle states and terminal reports.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{PageUrl, ScopeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Crawl job lifecycle: Queued -> InFlight -> {Completed, Failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    InFlight,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::InFlight => "in_flight",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final record of a crawl job, shared by every caller folded into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub id: JobId,
    pub url: PageUrl,
    /// Always terminal
    pub state: JobState,
    /// Frontier submits attempted
    pub attempts: u32,
    /// Every scope that requested this URL while the job was outstanding
    pub interested: Vec<ScopeId>,
    /// Scopes whose page counts were updated on completion
    pub applied: Vec<ScopeId>,
    /// All interested scopes were deleted before the result could be applied
    pub superseded: bool,
    pub error: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.state == JobState::Completed
    }

    /// Surface a failed job as `RetryExhausted`.
    pub fn check(&self) -> Result<()> {
        match self.state {
            JobState::Failed => Err(AppError::RetryExhausted {
                url: self.url.to_string(),
                attempts: self.attempts,
                last_error: self.error.clone().unwrap_or_default(),
            }),
            _ => Ok(()),
        }
    }
}

/// Observable progress of an outstanding job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobProgress {
    Queued,
    InFlight { attempt: u32 },
    Done(std::sync::Arc<JobReport>),
}

impl JobProgress {
    pub fn state(&self) -> JobState {
        match self {
            JobProgress::Queued => JobState::Queued,
            JobProgress::InFlight { .. } => JobState::InFlight,
            JobProgress::Done(report) => report.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(state: JobState) -> JobReport {
        JobReport {
            id: JobId::new(),
            url: PageUrl::parse("https://example.com/docs").unwrap(),
            state,
            attempts: 4,
            interested: vec![ScopeId::new()],
            applied: Vec::new(),
            superseded: false,
            error: Some("frontier unavailable: 503".to_string()),
            queued_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_failed_report_surfaces_retry_exhausted() {
        let err = report(JobState::Failed).check().unwrap_err();
        assert!(matches!(err, AppError::RetryExhausted { attempts: 4, .. }));
    }

    #[test]
    fn test_completed_report_checks_ok() {
        assert!(report(JobState::Completed).check().is_ok());
        assert!(JobState::Completed.is_terminal());
        assert!(!JobState::InFlight.is_terminal());
    }
}
