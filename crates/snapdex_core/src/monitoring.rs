//! Process-wide counters.

use std::sync::atomic::{AtomicU64, Ordering};
use serde::Serialize;

/// Receives a notification for every indexed file. Must never block or fail.
pub trait IndexTracker: Send + Sync {
    fn on_indexed(&self);
}

/// Counter set shared by the indexer and the read surface.
#[derive(Debug, Default)]
pub struct Tracker {
    indexed: AtomicU64,
    searches: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackerSnapshot {
    pub index_image_count: u64,
    pub search_request_count: u64,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_search(&self) {
        self.searches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            index_image_count: self.indexed.load(Ordering::Relaxed),
            search_request_count: self.searches.load(Ordering::Relaxed),
        }
    }
}

impl IndexTracker for Tracker {
    fn on_indexed(&self) {
        self.indexed.fetch_add(1, Ordering::Relaxed);
    }
}
