//! Run metrics owned by the supervisor.
//!
//! Stages update counters through explicit calls at their boundaries; the
//! supervisor exposes a serializable snapshot.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    PagesFetched,
    RevisionsIndexed,
    RevisionsFetched,
    RevisionsSkipped,
    ContentRequests,
    UsersCachedAtStart,
    UserCacheHits,
    UsersFetched,
    UserRequests,
    RevisionsQueued,
    RevisionsProcessed,
    UsersAnalysed,
    RevisionsCleaned,
    RevisionsDiffed,
    RevisionsFailed,
}

const COUNTERS: usize = 15;

/// Per-stage timing totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTiming {
    UserAnalysis,
    Cleaning,
    Diffing,
}

#[derive(Debug, Default)]
pub struct Metrics {
    counters: [AtomicU64; COUNTERS],
    user_analysis_ms: AtomicU64,
    cleaning_ms: AtomicU64,
    diffing_ms: AtomicU64,
    started_at: Mutex<Option<DateTime<Utc>>>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, n: u64) {
        self.counters[counter as usize].fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter as usize].load(Ordering::Relaxed)
    }

    pub fn record_timing(&self, stage: StageTiming, ms: u64) {
        let slot = match stage {
            StageTiming::UserAnalysis => &self.user_analysis_ms,
            StageTiming::Cleaning => &self.cleaning_ms,
            StageTiming::Diffing => &self.diffing_ms,
        };
        slot.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn mark_started(&self) {
        if let Ok(mut started) = self.started_at.lock() {
            started.get_or_insert_with(Utc::now);
        }
    }

    pub fn mark_finished(&self) {
        if let Ok(mut finished) = self.finished_at.lock() {
            *finished = Some(Utc::now());
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let started_at = self.started_at.lock().ok().and_then(|t| *t);
        let finished_at = self.finished_at.lock().ok().and_then(|t| *t);
        MetricsSnapshot {
            pages_fetched: self.get(Counter::PagesFetched),
            revisions_indexed: self.get(Counter::RevisionsIndexed),
            revisions_fetched: self.get(Counter::RevisionsFetched),
            revisions_skipped: self.get(Counter::RevisionsSkipped),
            content_requests: self.get(Counter::ContentRequests),
            users_cached_at_start: self.get(Counter::UsersCachedAtStart),
            user_cache_hits: self.get(Counter::UserCacheHits),
            users_fetched: self.get(Counter::UsersFetched),
            user_requests: self.get(Counter::UserRequests),
            revisions_queued: self.get(Counter::RevisionsQueued),
            revisions_processed: self.get(Counter::RevisionsProcessed),
            users_analysed: self.get(Counter::UsersAnalysed),
            revisions_cleaned: self.get(Counter::RevisionsCleaned),
            revisions_diffed: self.get(Counter::RevisionsDiffed),
            revisions_failed: self.get(Counter::RevisionsFailed),
            user_analysis_ms: self.user_analysis_ms.load(Ordering::Relaxed),
            cleaning_ms: self.cleaning_ms.load(Ordering::Relaxed),
            diffing_ms: self.diffing_ms.load(Ordering::Relaxed),
            started_at,
            finished_at,
        }
    }
}

/// Point-in-time copy of the run metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub pages_fetched: u64,
    pub revisions_indexed: u64,
    pub revisions_fetched: u64,
    pub revisions_skipped: u64,
    pub content_requests: u64,
    pub users_cached_at_start: u64,
    pub user_cache_hits: u64,
    pub users_fetched: u64,
    pub user_requests: u64,
    pub revisions_queued: u64,
    pub revisions_processed: u64,
    pub users_analysed: u64,
    pub revisions_cleaned: u64,
    pub revisions_diffed: u64,
    pub revisions_failed: u64,
    pub user_analysis_ms: u64,
    pub cleaning_ms: u64,
    pub diffing_ms: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl MetricsSnapshot {
    /// Log the summary block.
    pub fn log_summary(&self) {
        log::info!("=== Run Metrics ===");
        log::info!(
            "Index: {} pages, {} revisions",
            self.pages_fetched,
            self.revisions_indexed
        );
        log::info!(
            "Content: {} fetched, {} skipped, {} requests",
            self.revisions_fetched,
            self.revisions_skipped,
            self.content_requests
        );
        log::info!(
            "Authors: {} cached at start, {} cache hits, {} fetched in {} requests",
            self.users_cached_at_start,
            self.user_cache_hits,
            self.users_fetched,
            self.user_requests
        );
        log::info!(
            "Analysis: {} queued, {} processed, {} cleaned, {} diffed, {} failed",
            self.revisions_queued,
            self.revisions_processed,
            self.revisions_cleaned,
            self.revisions_diffed,
            self.revisions_failed
        );
        log::info!(
            "Timing: user analysis {}ms, cleaning {}ms, diffing {}ms",
            self.user_analysis_ms,
            self.cleaning_ms,
            self.diffing_ms
        );
        if let (Some(start), Some(end)) = (self.started_at, self.finished_at) {
            log::info!("Elapsed: {}s", (end - start).num_seconds());
        }
    }
}
