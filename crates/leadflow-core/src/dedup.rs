// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-capacity, insertion-ordered dedup set with FIFO eviction.
//!
//! Answers "have we seen this identifier before" in O(1) without unbounded
//! memory growth. State is process-lifetime only: an event fully processed
//! before a restart may be reprocessed, which the monotonic funnel and
//! CRM dedup-before-create make safe.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

struct Inner {
    seen: HashSet<String>,
    /// Insertion order, oldest at the front. Pure FIFO, not LRU: membership
    /// checks do not refresh an entry's position.
    order: VecDeque<String>,
}

/// Concurrent bounded set of recently seen identifiers.
pub struct BoundedDedupSet {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl BoundedDedupSet {
    /// Create a set holding at most `capacity` entries.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "dedup set capacity must be non-zero");
        Self {
            capacity,
            inner: Mutex::new(Inner {
                seen: HashSet::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
        }
    }

    /// Whether `id` is currently in the set.
    pub fn contains(&self, id: &str) -> bool {
        let inner = self.inner.lock().expect("dedup set lock poisoned");
        inner.seen.contains(id)
    }

    /// Insert `id`, evicting the single oldest entry first when full.
    ///
    /// Returns `true` if the id was newly inserted; `false` if it was
    /// already present (the dedup signal). A duplicate does not change
    /// the set's size or ordering.
    pub fn add(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().expect("dedup set lock poisoned");
        if inner.seen.contains(id) {
            return false;
        }
        if inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        inner.seen.insert(id.to_string());
        inner.order.push_back(id.to_string());
        true
    }

    /// Current number of entries (for diagnostics).
    pub fn len(&self) -> usize {
        self.inner.lock().expect("dedup set lock poisoned").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
