//! Lane metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single transport lane
#[derive(Debug, Default)]
pub struct LaneMetrics {
    /// Records currently parked in the pending queue
    pending_len: AtomicUsize,
    /// Total records parked while connecting
    queued_count: AtomicU64,
    /// Total successful sends
    sent_count: AtomicU64,
    /// Total send failures (including prober rejections)
    failed_count: AtomicU64,
    /// Total records dropped by a purge
    purged_count: AtomicU64,
    /// Sends the prober refused to run
    rejected_count: AtomicU64,
}

impl LaneMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.pending_len.load(Ordering::Relaxed)
    }

    pub fn set_pending_len(&self, len: usize) {
        self.pending_len.store(len, Ordering::Relaxed);
    }

    pub fn queued_count(&self) -> u64 {
        self.queued_count.load(Ordering::Relaxed)
    }

    pub fn inc_queued_count(&self) {
        self.queued_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent_count(&self) -> u64 {
        self.sent_count.load(Ordering::Relaxed)
    }

    pub fn inc_sent_count(&self) {
        self.sent_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed_count(&self) -> u64 {
        self.failed_count.load(Ordering::Relaxed)
    }

    pub fn inc_failed_count(&self) {
        self.failed_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn purged_count(&self) -> u64 {
        self.purged_count.load(Ordering::Relaxed)
    }

    pub fn add_purged_count(&self, count: usize) {
        self.purged_count.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }

    pub fn inc_rejected_count(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pending_len: self.pending_len(),
            queued_count: self.queued_count(),
            sent_count: self.sent_count(),
            failed_count: self.failed_count(),
            purged_count: self.purged_count(),
            rejected_count: self.rejected_count(),
        }
    }
}

/// Snapshot of lane metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub pending_len: usize,
    pub queued_count: u64,
    pub sent_count: u64,
    pub failed_count: u64,
    pub purged_count: u64,
    pub rejected_count: u64,
}
