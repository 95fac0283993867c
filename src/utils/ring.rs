// src/utils/ring.rs

//! Fixed-capacity ring buffer for recent-activity style logs.

use std::collections::VecDeque;

/// Keeps the newest `capacity` items; pushing past capacity evicts the oldest.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer. A capacity of zero keeps nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an item in O(1), evicting the oldest one when full.
    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate newest first.
    pub fn iter_newest(&self) -> impl Iterator<Item = &T> {
        self.items.iter().rev()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Snapshot of the contents, newest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.iter_newest().cloned().collect()
    }
}
