// src/services/activity.rs

//! Recent activity and crawl-queue feeds.

use std::sync::Mutex;

use chrono::Utc;

use crate::models::{ActivityEvent, ActivityKind, PageUrl, QueuedCrawl};
use crate::utils::{RingBuffer, lock};

/// Two bounded feeds: notable events and recently queued crawls.
pub struct ActivityLog {
    events: Mutex<RingBuffer<ActivityEvent>>,
    queue: Mutex<RingBuffer<QueuedCrawl>>,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(RingBuffer::new(capacity)),
            queue: Mutex::new(RingBuffer::new(capacity)),
        }
    }

    pub fn record(&self, kind: ActivityKind, description: impl Into<String>) {
        lock(&self.events).push(ActivityEvent {
            kind,
            description: description.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn record_queued(&self, url: &PageUrl, scope: impl Into<String>) {
        lock(&self.queue).push(QueuedCrawl {
            url: url.clone(),
            scope: scope.into(),
        });
    }

    /// Events, newest first.
    pub fn recent_events(&self) -> Vec<ActivityEvent> {
        lock(&self.events).snapshot()
    }

    /// Queued crawls, newest first.
    pub fn recent_queue(&self) -> Vec<QueuedCrawl> {
        lock(&self.queue).snapshot()
    }
}
