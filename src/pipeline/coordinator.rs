//! Crawl coordination.
//!
//! Accepts crawl requests for page URLs, deduplicates them by normalized URL,
//! and drives each job through the frontier with bounded concurrency:
//!
//! ```text
//! enqueue ──> [bounded queue] ──> worker (x max_concurrent)
//!                                   │ submit, retry with backoff
//!                                   ▼
//!                 record freshness + page counts ──> Done(report)
//! ```
//!
//! A request for a URL that already has an outstanding job folds into that
//! job: the scope joins its interested set and the caller observes the same
//! completion. When the queue reaches its high-water mark, new URLs are
//! rejected with `Backpressure` instead of growing the queue.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::clients::{CrawlMetadata, FrontierClient};
use crate::error::{AppError, Result};
use crate::models::{CoordinatorConfig, JobId, JobProgress, JobReport, JobState, PageUrl, ScopeId};
use crate::pipeline::backoff::RetryPolicy;
use crate::pipeline::freshness::FreshnessTracker;
use crate::storage::ScopeStore;
use crate::utils::{RingBuffer, lock};
use crate::utils::url::fingerprint;

/// Called once per finished job, after its effects are visible.
pub type FinishHook = Arc<dyn Fn(&JobReport) + Send + Sync>;

struct ActiveJob {
    id: JobId,
    interested: BTreeSet<ScopeId>,
    progress: watch::Sender<JobProgress>,
    queued_at: DateTime<Utc>,
}

struct Work {
    id: JobId,
    url: PageUrl,
}

enum Outcome {
    Crawled { attempts: u32 },
    Failed { attempts: u32, error: String },
    Superseded { attempts: u32 },
}

struct Inner {
    frontier: Arc<dyn FrontierClient>,
    scopes: Arc<ScopeStore>,
    freshness: Arc<FreshnessTracker>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    high_water: usize,
    active: Mutex<HashMap<PageUrl, ActiveJob>>,
    history: Mutex<RingBuffer<Arc<JobReport>>>,
    in_flight: AtomicUsize,
    on_finish: OnceLock<FinishHook>,
}

/// Handle to an outstanding (or finished) crawl job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    url: PageUrl,
    progress: watch::Receiver<JobProgress>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn url(&self) -> &PageUrl {
        &self.url
    }

    /// Current state without waiting.
    pub fn progress(&self) -> JobProgress {
        self.progress.borrow().clone()
    }

    /// Wait for the job to reach a terminal state.
    pub async fn wait(mut self) -> Result<Arc<JobReport>> {
        loop {
            if let JobProgress::Done(report) = &*self.progress.borrow_and_update() {
                return Ok(Arc::clone(report));
            }
            if self.progress.changed().await.is_err() {
                return match &*self.progress.borrow() {
                    JobProgress::Done(report) => Ok(Arc::clone(report)),
                    _ => Err(AppError::ShuttingDown),
                };
            }
        }
    }
}

/// Deduplicating crawl scheduler in front of the frontier.
pub struct CrawlCoordinator {
    inner: Arc<Inner>,
    intake: Mutex<Option<mpsc::Sender<Work>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl CrawlCoordinator {
    /// Start the worker pool. Must be called inside a Tokio runtime.
    pub fn new(
        config: &CoordinatorConfig,
        attempt_timeout: Duration,
        frontier: Arc<dyn FrontierClient>,
        scopes: Arc<ScopeStore>,
        freshness: Arc<FreshnessTracker>,
    ) -> Self {
        let high_water = config.high_water_mark.max(1);
        let (tx, rx) = mpsc::channel(high_water);
        let inner = Arc::new(Inner {
            frontier,
            scopes,
            freshness,
            policy: RetryPolicy::from(&config.retry),
            attempt_timeout,
            high_water,
            active: Mutex::new(HashMap::new()),
            history: Mutex::new(RingBuffer::new(config.history_capacity)),
            in_flight: AtomicUsize::new(0),
            on_finish: OnceLock::new(),
        });

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let workers = (0..config.max_concurrent.max(1))
            .map(|n| {
                let inner = Arc::clone(&inner);
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        let work = rx.lock().await.recv().await;
                        let Some(work) = work else { break };
                        inner.run(work).await;
                    }
                    log::debug!("Crawl worker {} stopped", n);
                })
            })
            .collect();

        log::info!(
            "Crawl coordinator started ({} workers, high-water mark {})",
            config.max_concurrent.max(1),
            high_water
        );

        Self {
            inner,
            intake: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    /// Install the finish hook. Only the first call takes effect.
    pub fn on_finish(&self, hook: FinishHook) -> bool {
        self.inner.on_finish.set(hook).is_ok()
    }

    /// Request a crawl of `url` on behalf of `scope_id`.
    pub fn enqueue(&self, url: &PageUrl, scope_id: ScopeId) -> Result<JobHandle> {
        if !self.inner.scopes.contains(scope_id) {
            return Err(AppError::NotFound(scope_id));
        }

        let mut active = lock(&self.inner.active);
        if let Some(job) = active.get_mut(url) {
            job.interested.insert(scope_id);
            log::debug!("Folded {} into outstanding job {}", url, job.id);
            return Ok(JobHandle {
                id: job.id,
                url: url.clone(),
                progress: job.progress.subscribe(),
            });
        }

        let sender = lock(&self.intake)
            .as_ref()
            .cloned()
            .ok_or(AppError::ShuttingDown)?;

        let id = JobId::new();
        match sender.try_send(Work {
            id,
            url: url.clone(),
        }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("Rejected {}: crawl queue at high-water mark", url);
                return Err(AppError::Backpressure {
                    queued: self.inner.high_water,
                    high_water: self.inner.high_water,
                });
            }
            Err(TrySendError::Closed(_)) => return Err(AppError::ShuttingDown),
        }

        let (progress, rx) = watch::channel(JobProgress::Queued);
        active.insert(
            url.clone(),
            ActiveJob {
                id,
                interested: BTreeSet::from([scope_id]),
                progress,
                queued_at: Utc::now(),
            },
        );
        log::debug!("Queued crawl job {} for {}", id, url);

        Ok(JobHandle {
            id,
            url: url.clone(),
            progress: rx,
        })
    }

    /// Progress of the outstanding job for `url`, if any.
    pub fn status(&self, url: &PageUrl) -> Option<JobProgress> {
        lock(&self.inner.active)
            .get(url)
            .map(|job| job.progress.borrow().clone())
    }

    /// Jobs currently talking to the frontier.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Jobs accepted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        lock(&self.inner.active)
            .values()
            .filter(|job| matches!(*job.progress.borrow(), JobProgress::Queued))
            .count()
    }

    /// Finished jobs, newest first.
    pub fn recent_jobs(&self) -> Vec<Arc<JobReport>> {
        lock(&self.inner.history).snapshot()
    }

    /// Stop accepting work and abandon outstanding jobs.
    ///
    /// Waiters on abandoned jobs observe `ShuttingDown`.
    pub fn shutdown(&self) {
        lock(&self.intake).take();
        for worker in lock(&self.workers).drain(..) {
            worker.abort();
        }
        let abandoned = lock(&self.inner.active).drain().count();
        log::info!("Crawl coordinator stopped ({} jobs abandoned)", abandoned);
    }
}

impl Drop for CrawlCoordinator {
    fn drop(&mut self) {
        for worker in lock(&self.workers).drain(..) {
            worker.abort();
        }
    }
}

impl Inner {
    async fn run(&self, work: Work) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let outcome = self.attempt_all(&work).await;
        self.in_flight.fetch_sub(1, Ordering::AcqRel);

        if let Some(outcome) = outcome {
            self.finish(&work, outcome);
        }
    }

    /// Submit with retries. None means the job vanished (shutdown).
    async fn attempt_all(&self, work: &Work) -> Option<Outcome> {
        let max_attempts = self.policy.max_attempts();
        let idempotency_key = format!("{}-{}", fingerprint(work.url.as_str()), work.id);
        let mut attempt = 0;

        loop {
            if !self.anyone_interested(&work.url)? {
                log::info!("Dropping crawl of {}: no interested scope left", work.url);
                return Some(Outcome::Superseded { attempts: attempt });
            }

            attempt += 1;
            let metadata = {
                let active = lock(&self.active);
                let job = active.get(&work.url)?;
                job.progress.send_replace(JobProgress::InFlight { attempt });
                CrawlMetadata {
                    scope_ids: job.interested.iter().copied().collect(),
                    idempotency_key: idempotency_key.clone(),
                }
            };

            let result =
                match tokio::time::timeout(self.attempt_timeout, self.frontier.submit(&work.url, &metadata))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AppError::collaborator(
                        "frontier",
                        format!("timed out after {} ms", self.attempt_timeout.as_millis()),
                    )),
                };

            let error = match result {
                Ok(()) => return Some(Outcome::Crawled { attempts: attempt }),
                Err(e) => e,
            };

            log::warn!(
                "Crawl attempt {}/{} for {} failed: {}",
                attempt,
                max_attempts,
                work.url,
                error
            );
            if !error.is_retryable() || attempt >= max_attempts {
                // A failure nobody is waiting on any more is not reported as one
                if !self.anyone_interested(&work.url)? {
                    return Some(Outcome::Superseded { attempts: attempt });
                }
                return Some(Outcome::Failed {
                    attempts: attempt,
                    error: error.to_string(),
                });
            }

            tokio::time::sleep(self.policy.delay_for(attempt - 1)).await;
        }
    }

    fn anyone_interested(&self, url: &PageUrl) -> Option<bool> {
        let active = lock(&self.active);
        let job = active.get(url)?;
        Some(job.interested.iter().any(|id| self.scopes.contains(*id)))
    }

    fn finish(&self, work: &Work, outcome: Outcome) {
        let Some(job) = lock(&self.active).remove(&work.url) else {
            return;
        };
        let now = Utc::now();
        let interested: Vec<ScopeId> = job.interested.iter().copied().collect();

        let (state, attempts, applied, error) = match outcome {
            Outcome::Crawled { attempts } => {
                let applied: Vec<ScopeId> = interested
                    .iter()
                    .copied()
                    .filter(|id| self.scopes.record_indexed(*id, &work.url))
                    .collect();
                // Released pages keep no freshness state
                if !applied.is_empty() || self.scopes.membership(&work.url).is_some() {
                    self.freshness.record_crawl(&work.url, now);
                }
                (JobState::Completed, attempts, applied, None)
            }
            Outcome::Failed { attempts, error } => (JobState::Failed, attempts, Vec::new(), Some(error)),
            Outcome::Superseded { attempts } => (JobState::Completed, attempts, Vec::new(), None),
        };

        let report = Arc::new(JobReport {
            id: job.id,
            url: work.url.clone(),
            state,
            attempts,
            superseded: state == JobState::Completed && applied.is_empty(),
            interested,
            applied,
            error,
            queued_at: job.queued_at,
            finished_at: now,
        });

        match report.state {
            JobState::Completed => log::info!(
                "Crawl job {} for {} completed after {} attempt(s)",
                report.id,
                report.url,
                report.attempts
            ),
            _ => log::error!(
                "Crawl job {} for {} failed after {} attempt(s)",
                report.id,
                report.url,
                report.attempts
            ),
        }

        lock(&self.history).push(Arc::clone(&report));
        if let Some(hook) = self.on_finish.get() {
            hook(&report);
        }
        job.progress.send_replace(JobProgress::Done(report));
    }
}
