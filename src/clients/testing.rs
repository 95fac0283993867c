//! Scripted collaborators for tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::clients::{CrawlMetadata, FrontierClient, RetrievalClient};
use crate::error::{AppError, Result};
use crate::models::{PageUrl, RetrievalHit, RetrievalRequest};

/// Frontier double: optional failures, an optional gate, and a call log.
#[derive(Default)]
pub(crate) struct ScriptedFrontier {
    failures_left: AtomicU32,
    fail_forever: bool,
    hang: bool,
    gate: Option<Arc<Semaphore>>,
    calls: Mutex<Vec<(PageUrl, CrawlMetadata)>>,
}

impl ScriptedFrontier {
    pub(crate) fn ok() -> Self {
        Self::default()
    }

    pub(crate) fn failing(times: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(times),
            ..Self::default()
        }
    }

    pub(crate) fn always_failing() -> Self {
        Self {
            fail_forever: true,
            ..Self::default()
        }
    }

    pub(crate) fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    /// Every submit blocks until the returned semaphore gets a permit.
    pub(crate) fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let frontier = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (frontier, gate)
    }

    /// Like [`Self::gated`], but every released submit fails.
    pub(crate) fn gated_failing() -> (Self, Arc<Semaphore>) {
        let (frontier, gate) = Self::gated();
        let frontier = Self {
            fail_forever: true,
            ..frontier
        };
        (frontier, gate)
    }

    pub(crate) fn calls(&self) -> Vec<(PageUrl, CrawlMetadata)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Poll until at least `n` submits were seen.
    pub(crate) async fn wait_for_calls(&self, n: usize) {
        for _ in 0..400 {
            if self.call_count() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("frontier saw {} calls, expected {n}", self.call_count());
    }
}

#[async_trait]
impl FrontierClient for ScriptedFrontier {
    async fn submit(&self, url: &PageUrl, metadata: &CrawlMetadata) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((url.clone(), metadata.clone()));

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| AppError::collaborator("frontier", e))?
                .forget();
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.fail_forever {
            return Err(AppError::collaborator("frontier", "HTTP 503"));
        }
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AppError::collaborator("frontier", "HTTP 503"));
        }
        Ok(())
    }
}

pub(crate) enum RetrievalBehavior {
    Hits(Vec<RetrievalHit>),
    Fail,
    Hang,
}

/// Retrieval double returning a fixed answer and logging requests.
pub(crate) struct ScriptedRetrieval {
    behavior: RetrievalBehavior,
    requests: Mutex<Vec<RetrievalRequest>>,
}

impl ScriptedRetrieval {
    pub(crate) fn new(behavior: RetrievalBehavior) -> Self {
        Self {
            behavior,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn hits(hits: Vec<RetrievalHit>) -> Self {
        Self::new(RetrievalBehavior::Hits(hits))
    }

    pub(crate) fn requests(&self) -> Vec<RetrievalRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetrievalClient for ScriptedRetrieval {
    async fn search(&self, request: &RetrievalRequest) -> Result<Vec<RetrievalHit>> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.behavior {
            RetrievalBehavior::Hits(hits) => Ok(hits.clone()),
            RetrievalBehavior::Fail => Err(AppError::collaborator("retrieval", "HTTP 502")),
            RetrievalBehavior::Hang => std::future::pending().await,
        }
    }
}

/// Build a hit the way the retrieval backend reports it.
pub(crate) fn hit(url: &str, relevance: f64) -> RetrievalHit {
    RetrievalHit {
        url: url.to_string(),
        title: None,
        snippet: format!("About {url}"),
        relevance,
    }
}
