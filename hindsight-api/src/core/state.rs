//! Shared application state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use hindsight_core::MemoryEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MemoryEngine>,
    pub stats: Arc<ApiStats>,
}

/// Request counters, served by `/stats`.
#[derive(Debug)]
pub struct ApiStats {
    context_requests: AtomicU64,
    memory_writes: AtomicU64,
    searches: AtomicU64,
    started_at: DateTime<Utc>,
}

impl ApiStats {
    pub fn new() -> Self {
        Self {
            context_requests: AtomicU64::new(0),
            memory_writes: AtomicU64::new(0),
            searches: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn count_context_request(&self) {
        self.context_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_memory_write(&self) {
        self.memory_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_search(&self) {
        self.searches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ApiStatsSnapshot {
        ApiStatsSnapshot {
            context_requests: self.context_requests.load(Ordering::Relaxed),
            memory_writes: self.memory_writes.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }
}

impl Default for ApiStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct ApiStatsSnapshot {
    pub context_requests: u64,
    pub memory_writes: u64,
    pub searches: u64,
    pub uptime_secs: u64,
}
