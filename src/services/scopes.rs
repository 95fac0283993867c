// src/services/scopes.rs

//! Scope service: the single entry point tying the store, the crawl
//! coordinator, freshness tracking and scoped queries together.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle as TaskHandle;

use crate::clients::{FrontierClient, HttpFrontierClient, HttpRetrievalClient, RetrievalClient};
use crate::error::{AppError, Result};
use crate::models::{
    ActivityKind, Config, JobReport, JobState, NewPage, NewScope, Page, PageUrl, QueryRequest,
    QueryResponse, Scope, ScopeFreshness, ScopeId, ScopePatch, Seed, Stats,
};
use crate::pipeline::{CrawlCoordinator, FreshnessTracker, JobHandle, QueryOrchestrator};
use crate::services::ActivityLog;
use crate::storage::ScopeStore;
use crate::utils::lock;

/// A page registered through [`ScopeService::add_page`].
#[derive(Debug)]
pub struct AddedPage {
    pub url: PageUrl,
    /// Present when a crawl was requested
    pub job: Option<JobHandle>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedUrl {
    pub url: String,
    pub reason: String,
}

/// Outcome of a bulk page add.
#[derive(Debug, Default)]
pub struct BulkAddReport {
    pub total: usize,
    pub queued: usize,
    pub rejected: Vec<RejectedUrl>,
    pub jobs: Vec<JobHandle>,
}

/// Outcome of one auto-track refresh pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub stale: usize,
    pub queued: usize,
    /// The pass ended early because the crawl queue was full
    pub backpressured: bool,
}

/// A scope created from seed data.
#[derive(Debug)]
pub struct SeededScope {
    pub scope: Scope,
    pub pages: BulkAddReport,
}

pub struct ScopeService {
    config: Arc<Config>,
    scopes: Arc<ScopeStore>,
    freshness: Arc<FreshnessTracker>,
    coordinator: CrawlCoordinator,
    orchestrator: QueryOrchestrator,
    activity: Arc<ActivityLog>,
    refresher: Mutex<Option<TaskHandle<()>>>,
}

impl ScopeService {
    /// Build a service talking to the configured HTTP collaborators.
    pub fn new(config: Config) -> Result<Self> {
        let frontier = HttpFrontierClient::new(&config.http, &config.frontier)?;
        let retrieval = HttpRetrievalClient::new(&config.http, &config.retrieval)?;
        Ok(Self::with_clients(config, Arc::new(frontier), Arc::new(retrieval)))
    }

    /// Build a service on explicit collaborators. Must run inside a Tokio runtime.
    pub fn with_clients(
        config: Config,
        frontier: Arc<dyn FrontierClient>,
        retrieval: Arc<dyn RetrievalClient>,
    ) -> Self {
        let config = Arc::new(config);
        let scopes = Arc::new(ScopeStore::new());
        let freshness = Arc::new(FreshnessTracker::new(&config.freshness));
        let activity = Arc::new(ActivityLog::new(config.activity.capacity));

        let coordinator = CrawlCoordinator::new(
            &config.coordinator,
            config.frontier.timeout(),
            frontier,
            Arc::clone(&scopes),
            Arc::clone(&freshness),
        );
        let feed = Arc::clone(&activity);
        coordinator.on_finish(Arc::new(move |report: &JobReport| record_job(&feed, report)));

        let orchestrator = QueryOrchestrator::new(
            Arc::clone(&scopes),
            Arc::clone(&freshness),
            retrieval,
            config.retrieval.clone(),
            config.ranking.clone(),
        );

        Self {
            config,
            scopes,
            freshness,
            coordinator,
            orchestrator,
            activity,
            refresher: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn create_scope(&self, new: NewScope) -> Result<Scope> {
        let scope = self.scopes.create(new)?;
        self.activity.record(
            ActivityKind::ScopeCreated,
            format!("Created scope '{}'", scope.name),
        );
        Ok(scope)
    }

    pub fn get_scope(&self, id: ScopeId) -> Result<Scope> {
        self.scopes.get(id)
    }

    pub fn list_scopes(&self) -> Vec<Scope> {
        self.scopes.list()
    }

    /// Apply a partial update. A pattern change releases pages that no
    /// scope holds any more, along with their freshness state.
    pub fn update_scope(&self, id: ScopeId, patch: ScopePatch) -> Result<Scope> {
        let repatterned = patch.patterns.is_set();
        let scope = self.scopes.update(id, patch)?;
        if repatterned {
            for url in self.scopes.release_unowned() {
                self.freshness.forget(url.as_str());
            }
        }
        self.activity.record(
            ActivityKind::ScopeUpdated,
            format!("Updated scope '{}'", scope.name),
        );
        Ok(scope)
    }

    /// Delete a scope; pages it alone owned lose their freshness state too.
    pub fn delete_scope(&self, id: ScopeId) -> Result<Vec<PageUrl>> {
        let name = self.scopes.name_of(id).unwrap_or_default();
        let released = self.scopes.delete(id)?;
        for url in &released {
            self.freshness.forget(url.as_str());
        }
        self.activity.record(
            ActivityKind::ScopeDeleted,
            format!("Deleted scope '{}'", name),
        );
        Ok(released)
    }

    /// Register a page with a scope and optionally request a crawl.
    ///
    /// The page stays registered even when the crawl is rejected.
    pub fn add_page(&self, id: ScopeId, page: NewPage) -> Result<AddedPage> {
        let url = PageUrl::parse(&page.url)?;
        self.scopes.attach_page(id, &url, page.title)?;
        let scope_name = self.scopes.name_of(id).unwrap_or_default();
        self.activity.record(
            ActivityKind::PageAdded,
            format!("Added {} to '{}'", url, scope_name),
        );

        let job = if page.trigger_crawl {
            let handle = self.coordinator.enqueue(&url, id)?;
            self.activity.record_queued(&url, scope_name);
            Some(handle)
        } else {
            None
        };
        Ok(AddedPage { url, job })
    }

    /// Register and crawl many URLs; per-URL failures are reported, not raised.
    pub fn add_pages_bulk<S: AsRef<str>>(&self, id: ScopeId, urls: &[S]) -> Result<BulkAddReport> {
        let scope_name = self.scopes.name_of(id).ok_or(AppError::NotFound(id))?;
        let mut report = BulkAddReport {
            total: urls.len(),
            ..BulkAddReport::default()
        };

        for raw in urls {
            let raw = raw.as_ref();
            let result = PageUrl::parse(raw).and_then(|url| {
                self.scopes.attach_page(id, &url, None)?;
                let handle = self.coordinator.enqueue(&url, id)?;
                Ok((url, handle))
            });
            match result {
                Ok((url, handle)) => {
                    self.activity.record_queued(&url, scope_name.clone());
                    report.queued += 1;
                    report.jobs.push(handle);
                }
                Err(AppError::NotFound(id)) => return Err(AppError::NotFound(id)),
                Err(e) => report.rejected.push(RejectedUrl {
                    url: raw.to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        self.activity.record(
            ActivityKind::PageAdded,
            format!(
                "Added {} of {} pages to '{}'",
                report.queued, report.total, scope_name
            ),
        );
        log::info!(
            "Bulk add to '{}': {} queued, {} rejected",
            scope_name,
            report.queued,
            report.rejected.len()
        );
        Ok(report)
    }

    /// Create every seeded scope and register its pages.
    ///
    /// With `trigger_crawl` off, pages are registered without crawl jobs.
    pub fn apply_seed(&self, seed: &Seed, trigger_crawl: bool) -> Result<Vec<SeededScope>> {
        seed.validate()?;
        let mut seeded = Vec::with_capacity(seed.scopes.len());

        for entry in &seed.scopes {
            let scope = self.create_scope(entry.to_new_scope())?;
            let mut pages = BulkAddReport {
                total: entry.pages.len(),
                ..BulkAddReport::default()
            };

            for raw in &entry.pages {
                let page = NewPage::new(raw.as_str());
                let page = if trigger_crawl { page } else { page.without_crawl() };
                match self.add_page(scope.id, page) {
                    Ok(AddedPage { job: Some(job), .. }) => {
                        pages.queued += 1;
                        pages.jobs.push(job);
                    }
                    Ok(_) => {}
                    Err(AppError::NotFound(id)) => return Err(AppError::NotFound(id)),
                    Err(e) => pages.rejected.push(RejectedUrl {
                        url: raw.clone(),
                        reason: e.to_string(),
                    }),
                }
            }

            log::info!(
                "Seeded scope '{}' with {} pages ({} rejected)",
                scope.name,
                pages.total - pages.rejected.len(),
                pages.rejected.len()
            );
            seeded.push(SeededScope { scope, pages });
        }
        Ok(seeded)
    }

    /// Read view of a known page, or None if no scope holds it.
    pub fn page(&self, raw_url: &str) -> Result<Option<Page>> {
        let url = PageUrl::parse(raw_url)?;
        let Some((title, scopes)) = self.scopes.page(&url) else {
            return Ok(None);
        };
        Ok(Some(Page {
            freshness: self.freshness.score(url.as_str(), Utc::now()),
            last_crawled: self.freshness.last_crawled(url.as_str()),
            scopes: scopes.into_iter().collect(),
            title,
            url,
        }))
    }

    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        self.orchestrator.query(request).await
    }

    pub fn stats(&self) -> Stats {
        self.stats_at(Utc::now())
    }

    /// Snapshot of counts, feeds and per-scope freshness as of `now`.
    pub fn stats_at(&self, now: DateTime<Utc>) -> Stats {
        let threshold = self.config.freshness.stale_threshold;
        let scopes = self.scopes.list();

        let freshness = scopes
            .iter()
            .map(|scope| {
                let scores: Vec<f64> = self
                    .scopes
                    .pages_in_scopes(&[scope.id])
                    .iter()
                    .map(|page| self.freshness.score(page.url.as_str(), now))
                    .collect();
                let mean_freshness = if scores.is_empty() {
                    0.0
                } else {
                    scores.iter().sum::<f64>() / scores.len() as f64
                };
                ScopeFreshness {
                    scope_id: scope.id,
                    name: scope.name.clone(),
                    pages: scores.len(),
                    stale_pages: scores.iter().filter(|s| **s < threshold).count(),
                    mean_freshness,
                }
            })
            .collect();

        Stats {
            total_scopes: scopes.len(),
            total_pages: scopes.iter().map(|s| s.page_count).sum(),
            active_crawls: self.coordinator.in_flight(),
            pending_crawls: self.coordinator.queued(),
            recent_activity: self.activity.recent_events(),
            crawl_queue: self.activity.recent_queue(),
            freshness,
        }
    }

    /// Finished crawl jobs, newest first.
    pub fn recent_jobs(&self) -> Vec<Arc<JobReport>> {
        self.coordinator.recent_jobs()
    }

    /// Re-enqueue stale pages of every auto-tracked scope.
    pub fn refresh_stale(&self, now: DateTime<Utc>) -> RefreshOutcome {
        let threshold = self.config.freshness.stale_threshold;
        let mut outcome = RefreshOutcome::default();

        'scopes: for id in self.scopes.auto_tracked() {
            let scope_name = self.scopes.name_of(id).unwrap_or_default();
            for page in self.scopes.pages_in_scopes(&[id]) {
                if !self.freshness.is_stale(page.url.as_str(), now, threshold) {
                    continue;
                }
                outcome.stale += 1;
                match self.coordinator.enqueue(&page.url, id) {
                    Ok(_) => {
                        self.activity.record_queued(&page.url, scope_name.clone());
                        outcome.queued += 1;
                    }
                    Err(AppError::NotFound(_)) => continue 'scopes,
                    Err(AppError::Backpressure { .. }) => {
                        outcome.backpressured = true;
                        break 'scopes;
                    }
                    Err(e) => {
                        log::warn!("Refresh pass stopped: {}", e);
                        break 'scopes;
                    }
                }
            }
        }

        if outcome.stale > 0 {
            log::info!(
                "Refresh pass: {} stale, {} queued{}",
                outcome.stale,
                outcome.queued,
                if outcome.backpressured { " (queue full)" } else { "" }
            );
        }
        outcome
    }

    /// Start the periodic refresher. Returns false when disabled by config.
    pub fn spawn_refresher(self: &Arc<Self>) -> bool {
        let secs = self.config.freshness.refresh_interval_secs;
        if secs == 0 {
            return false;
        }

        let service = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            // The first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(service) = service.upgrade() else { break };
                service.refresh_stale(Utc::now());
            }
        });

        if let Some(previous) = lock(&self.refresher).replace(task) {
            previous.abort();
        }
        log::info!("Auto-track refresher running every {}s", secs);
        true
    }

    /// Stop the refresher and the crawl workers.
    pub fn shutdown(&self) {
        if let Some(task) = lock(&self.refresher).take() {
            task.abort();
        }
        self.coordinator.shutdown();
    }
}

impl Drop for ScopeService {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.refresher).take() {
            task.abort();
        }
    }
}

fn record_job(activity: &ActivityLog, report: &JobReport) {
    match report.state {
        JobState::Failed => activity.record(
            ActivityKind::CrawlFailed,
            format!(
                "Crawl of {} failed: {}",
                report.url,
                report.error.as_deref().unwrap_or("unknown error")
            ),
        ),
        _ => activity.record(ActivityKind::CrawlCompleted, format!("Crawled {}", report.url)),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::clients::testing::{RetrievalBehavior, ScriptedFrontier, ScriptedRetrieval, hit};
    use crate::models::RetrievalMode;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.coordinator.retry.base_delay_ms = 5;
        config.coordinator.retry.max_delay_ms = 20;
        config.retrieval.timeout_ms = 50;
        config.freshness.half_life_secs = 3600;
        config
    }

    fn service(frontier: ScriptedFrontier, retrieval: RetrievalBehavior) -> ScopeService {
        ScopeService::with_clients(
            test_config(),
            Arc::new(frontier),
            Arc::new(ScriptedRetrieval::new(retrieval)),
        )
    }

    fn docs(service: &ScopeService) -> Scope {
        service
            .create_scope(
                NewScope::new("Docs")
                    .with_description("Product docs")
                    .with_patterns(["https://example.com/docs/**"]),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_docs_scope_end_to_end() {
        let service = service(
            ScriptedFrontier::ok(),
            RetrievalBehavior::Hits(vec![hit("https://example.com/docs/api", 0.9)]),
        );
        let scope = docs(&service);

        let added = service
            .add_page(scope.id, NewPage::new("https://example.com/docs/api").with_title("API"))
            .unwrap();
        let report = added.job.unwrap().wait().await.unwrap();
        assert!(report.is_success());

        assert_eq!(service.get_scope(scope.id).unwrap().page_count, 1);
        let page = service.page("https://EXAMPLE.com/docs/api/").unwrap().unwrap();
        assert_eq!(page.scopes, vec![scope.id]);
        assert_eq!(page.title.as_deref(), Some("API"));
        assert!(page.freshness > 0.99);
        assert!(page.last_crawled.is_some());

        let response = service
            .query(&QueryRequest::new("api", vec![scope.id]))
            .await
            .unwrap();
        assert!(!response.degraded);
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].relevance, Some(0.9));
    }

    #[tokio::test]
    async fn test_retrieval_timeout_degrades_query() {
        let service = service(ScriptedFrontier::ok(), RetrievalBehavior::Hang);
        let scope = docs(&service);
        service
            .add_page(scope.id, NewPage::new("https://example.com/docs/install").without_crawl())
            .unwrap();

        let response = service
            .query(&QueryRequest::new("install", vec![scope.id]))
            .await
            .unwrap();
        assert!(response.degraded);
        assert_eq!(response.results.len(), 1);
        assert!(response.results[0].relevance.is_none());
    }

    #[tokio::test]
    async fn test_delete_forgets_released_pages() {
        let service = service(ScriptedFrontier::ok(), RetrievalBehavior::Fail);
        let scope = docs(&service);
        let added = service
            .add_page(scope.id, NewPage::new("https://example.com/docs/api"))
            .unwrap();
        added.job.unwrap().wait().await.unwrap();

        let released = service.delete_scope(scope.id).unwrap();
        assert_eq!(released, vec![added.url.clone()]);
        assert!(service.page(added.url.as_str()).unwrap().is_none());
        assert!(matches!(service.get_scope(scope.id), Err(AppError::NotFound(_))));

        let kinds: Vec<ActivityKind> = service
            .stats()
            .recent_activity
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds[0], ActivityKind::ScopeDeleted);
        assert!(kinds.contains(&ActivityKind::CrawlCompleted));
    }

    #[tokio::test]
    async fn test_page_kept_only_by_patterns_is_released_with_them() {
        let service = service(ScriptedFrontier::ok(), RetrievalBehavior::Fail);
        let holder = service.create_scope(NewScope::new("Holder")).unwrap();
        let scope = docs(&service);
        let added = service
            .add_page(holder.id, NewPage::new("https://example.com/docs/api"))
            .unwrap();
        added.job.unwrap().wait().await.unwrap();

        assert!(service.delete_scope(holder.id).unwrap().is_empty());
        assert_eq!(service.page(added.url.as_str()).unwrap().unwrap().scopes, vec![scope.id]);

        service
            .update_scope(scope.id, ScopePatch::default().patterns(["https://example.com/blog/*"]))
            .unwrap();
        assert!(service.page(added.url.as_str()).unwrap().is_none());
        assert!(service.freshness.last_crawled(added.url.as_str()).is_none());
    }

    #[tokio::test]
    async fn test_bulk_add_reports_rejections() {
        let service = service(ScriptedFrontier::ok(), RetrievalBehavior::Fail);
        let scope = docs(&service);

        let report = service
            .add_pages_bulk(
                scope.id,
                &["https://example.com/docs/a", "ftp://example.com/x", "https://example.com/docs/b"],
            )
            .unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.queued, 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].url, "ftp://example.com/x");

        for job in report.jobs {
            job.wait().await.unwrap();
        }
        assert_eq!(service.get_scope(scope.id).unwrap().page_count, 2);

        assert!(matches!(
            service.add_pages_bulk(ScopeId::new(), &["https://example.com/docs/a"]),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_stats_summarize_freshness() {
        let service = service(ScriptedFrontier::ok(), RetrievalBehavior::Fail);
        let scope = docs(&service);
        let crawled = service
            .add_page(scope.id, NewPage::new("https://example.com/docs/api"))
            .unwrap();
        crawled.job.unwrap().wait().await.unwrap();
        service
            .add_page(scope.id, NewPage::new("https://example.com/docs/old").without_crawl())
            .unwrap();

        let stats = service.stats();
        assert_eq!(stats.total_scopes, 1);
        assert_eq!(stats.total_pages, 1);
        assert_eq!(stats.crawl_queue.len(), 1);
        let summary = &stats.freshness[0];
        assert_eq!(summary.pages, 2);
        assert_eq!(summary.stale_pages, 1);
        assert!(summary.mean_freshness > 0.49 && summary.mean_freshness <= 0.5);
        assert_eq!(service.recent_jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_only_touches_auto_tracked_scopes() {
        let frontier = Arc::new(ScriptedFrontier::ok());
        let service = ScopeService::with_clients(
            test_config(),
            Arc::clone(&frontier) as Arc<dyn FrontierClient>,
            Arc::new(ScriptedRetrieval::hits(Vec::new())),
        );
        let tracked = service
            .create_scope(
                NewScope::new("Tracked")
                    .with_patterns(["https://example.com/docs/**"])
                    .auto_track(true),
            )
            .unwrap();
        let manual = service
            .create_scope(NewScope::new("Manual").with_patterns(["https://example.com/blog/*"]))
            .unwrap();
        service
            .add_page(tracked.id, NewPage::new("https://example.com/docs/a").without_crawl())
            .unwrap();
        service
            .add_page(manual.id, NewPage::new("https://example.com/blog/b").without_crawl())
            .unwrap();

        let outcome = service.refresh_stale(Utc::now());
        assert_eq!(outcome.stale, 1);
        assert_eq!(outcome.queued, 1);
        assert!(!outcome.backpressured);

        frontier.wait_for_calls(1).await;
        let (url, metadata) = frontier.calls().remove(0);
        assert_eq!(url.as_str(), "https://example.com/docs/a");
        assert_eq!(metadata.scope_ids, vec![tracked.id]);
    }

    #[tokio::test]
    async fn test_fresh_pages_are_not_refreshed() {
        let service = service(ScriptedFrontier::ok(), RetrievalBehavior::Fail);
        let scope = service
            .create_scope(
                NewScope::new("Tracked")
                    .with_patterns(["https://example.com/docs/**"])
                    .auto_track(true),
            )
            .unwrap();
        let added = service
            .add_page(scope.id, NewPage::new("https://example.com/docs/a"))
            .unwrap();
        added.job.unwrap().wait().await.unwrap();

        assert_eq!(service.refresh_stale(Utc::now()).stale, 0);
        // Four half-life constants later the page is stale again
        let later = Utc::now() + ChronoDuration::hours(4);
        assert_eq!(service.refresh_stale(later).queued, 1);
    }

    #[tokio::test]
    async fn test_apply_seed_registers_scopes_and_pages() {
        let service = service(ScriptedFrontier::ok(), RetrievalBehavior::Fail);
        let seed: Seed = toml::from_str(
            r#"
[[scopes]]
name = "Docs"
patterns = ["https://example.com/docs/**"]
pages = ["https://example.com/docs/install", "mailto:someone@example.com"]

[[scopes]]
name = "Blog"
auto_track = true
"#,
        )
        .unwrap();

        let seeded = service.apply_seed(&seed, false).unwrap();
        assert_eq!(seeded.len(), 2);
        assert_eq!(seeded[0].pages.total, 2);
        assert_eq!(seeded[0].pages.queued, 0);
        assert_eq!(seeded[0].pages.rejected.len(), 1);
        assert!(seeded[1].scope.auto_track);
        assert!(service.page("https://example.com/docs/install").unwrap().is_some());
        assert_eq!(service.list_scopes().len(), 2);
    }

    #[tokio::test]
    async fn test_refresher_disabled_by_default() {
        let service = Arc::new(service(ScriptedFrontier::ok(), RetrievalBehavior::Fail));
        assert!(!service.spawn_refresher());
        assert_eq!(service.config().retrieval.mode, RetrievalMode::Hybrid);
        service.shutdown();
    }
}
