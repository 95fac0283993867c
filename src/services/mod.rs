//! Service layer for the scope coordinator.
//!
//! - Scope lifecycle, pages, crawls and queries (`ScopeService`)
//! - Recent activity and crawl-queue feeds (`ActivityLog`)

mod activity;
mod scopes;

pub use activity::ActivityLog;
pub use scopes::{AddedPage, BulkAddReport, RefreshOutcome, RejectedUrl, ScopeService, SeededScope};
