//! Cross-task statistics shared by concurrent workers.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters mutated by many workers and read only after all of them join.
///
/// Thread-based workers share one instance and update it atomically.
/// Process-partitioned deployments keep one instance per process and fold
/// the partial sums into the dispatcher's instance with [`merge`].
///
/// [`merge`]: SharedStats::merge
#[derive(Debug, Default)]
pub struct SharedStats {
    op_failure_count: AtomicU64,
    total_bytes_transferred: AtomicU64,
}

impl SharedStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one permanently failed operation.
    pub fn record_failure(&self) {
        self.op_failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Add bytes moved by one successful transfer.
    pub fn add_bytes(&self, bytes: u64) {
        self.total_bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn failures(&self) -> u64 {
        self.op_failure_count.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.total_bytes_transferred.load(Ordering::Relaxed)
    }

    /// Fold another instance's partial sums into this one.
    pub fn merge(&self, other: &SharedStats) {
        self.op_failure_count
            .fetch_add(other.failures(), Ordering::Relaxed);
        self.total_bytes_transferred
            .fetch_add(other.bytes(), Ordering::Relaxed);
    }
}
