//! # Coordinator Statistics
//!
//! SWMR atomic counters for coordinator observability. Hot paths record with
//! `Relaxed` ordering; readers take a [`BatchStatsSnapshot`].

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Why a buffer was detached and dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushTrigger {
    /// The buffer reached `max_batch_size`
    Size,
    /// The flush interval elapsed
    Timer,
    /// `BatchCoordinator::flush` was called
    Manual,
    /// Final flush performed by disposal
    Dispose,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Timer => "timer",
            FlushTrigger::Manual => "manual",
            FlushTrigger::Dispose => "dispose",
        }
    }
}

impl std::fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic coordinator statistics
#[derive(Debug, Default)]
pub struct BatchStats {
    submitted: AtomicU64,
    rejected: AtomicU64,
    batches_dispatched: AtomicU64,
    size_flushes: AtomicU64,
    timer_flushes: AtomicU64,
    manual_flushes: AtomicU64,
    dispose_flushes: AtomicU64,
    batches_failed: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_failed: AtomicU64,
    missing_results: AtomicU64,
    disposed_pending: AtomicU64,
    largest_batch: AtomicU64,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a detached buffer handed to the processor
    pub fn record_dispatch(&self, trigger: FlushTrigger, batch_size: usize) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.largest_batch
            .fetch_max(batch_size as u64, Ordering::Relaxed);

        let counter = match trigger {
            FlushTrigger::Size => &self.size_flushes,
            FlushTrigger::Timer => &self.timer_flushes,
            FlushTrigger::Manual => &self.manual_flushes,
            FlushTrigger::Dispose => &self.dispose_flushes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the per-request outcome of a successful batch
    pub fn record_batch_resolved(&self, succeeded: usize, missing: usize) {
        self.requests_succeeded
            .fetch_add(succeeded as u64, Ordering::Relaxed);
        self.missing_results
            .fetch_add(missing as u64, Ordering::Relaxed);
        self.requests_failed
            .fetch_add(missing as u64, Ordering::Relaxed);
    }

    /// Record a whole-batch processing failure
    pub fn record_batch_failed(&self, batch_size: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.requests_failed
            .fetch_add(batch_size as u64, Ordering::Relaxed);
    }

    /// Record requests failed by a `FailPending` disposal
    pub fn record_disposed_pending(&self, count: usize) {
        self.disposed_pending
            .fetch_add(count as u64, Ordering::Relaxed);
        self.requests_failed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BatchStatsSnapshot {
        BatchStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            size_flushes: self.size_flushes.load(Ordering::Relaxed),
            timer_flushes: self.timer_flushes.load(Ordering::Relaxed),
            manual_flushes: self.manual_flushes.load(Ordering::Relaxed),
            dispose_flushes: self.dispose_flushes.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            requests_succeeded: self.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            missing_results: self.missing_results.load(Ordering::Relaxed),
            disposed_pending: self.disposed_pending.load(Ordering::Relaxed),
            largest_batch: self.largest_batch.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of coordinator statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStatsSnapshot {
    pub submitted: u64,
    pub rejected: u64,
    pub batches_dispatched: u64,
    pub size_flushes: u64,
    pub timer_flushes: u64,
    pub manual_flushes: u64,
    pub dispose_flushes: u64,
    pub batches_failed: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub missing_results: u64,
    pub disposed_pending: u64,
    pub largest_batch: u64,
}

impl BatchStatsSnapshot {
    /// Requests accepted but not yet resolved either way
    pub fn in_flight(&self) -> u64 {
        self.submitted
            .saturating_sub(self.requests_succeeded + self.requests_failed)
    }
}
