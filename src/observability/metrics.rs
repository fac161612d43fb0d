//! Query metrics
//!
//! - Counters only
//! - Monotonic increase
//! - Thread-safe, Relaxed ordering (counters are advisory)

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for the asynchronous query path.
///
/// Shared between origin contexts and the dispatcher's workers.
#[derive(Debug, Default)]
pub struct QueryMetrics {
    submitted: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    version_mismatches: AtomicU64,
    rederived: AtomicU64,
    converged: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    dropped_messages: AtomicU64,
}

impl QueryMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an accepted request
    pub fn increment_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an attempt handed to a worker
    pub fn increment_attempts(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a retry scheduled after a mismatch
    pub fn increment_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a worker/origin version disagreement
    pub fn increment_version_mismatches(&self) {
        self.version_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a mismatch resolved by import
    pub fn increment_rederived(&self) {
        self.rederived.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a delivered result
    pub fn increment_converged(&self) {
        self.converged.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a delivered error
    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a request that ended cancelled
    pub fn increment_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a message discarded by an origin context
    pub fn increment_dropped_messages(&self) {
        self.dropped_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            version_mismatches: self.version_mismatches.load(Ordering::Relaxed),
            rederived: self.rederived.load(Ordering::Relaxed),
            converged: self.converged.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            dropped_messages: self.dropped_messages.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of `QueryMetrics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub attempts: u64,
    pub retries: u64,
    pub version_mismatches: u64,
    pub rederived: u64,
    pub converged: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub dropped_messages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_start_at_zero() {
        let metrics = QueryMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_metrics_increment() {
        let metrics = QueryMetrics::new();
        metrics.increment_submitted();
        metrics.increment_attempts();
        metrics.increment_attempts();
        metrics.increment_version_mismatches();
        metrics.increment_retries();
        metrics.increment_converged();

        let snap = metrics.snapshot();
        assert_eq!(snap.submitted, 1);
        assert_eq!(snap.attempts, 2);
        assert_eq!(snap.retries, 1);
        assert_eq!(snap.version_mismatches, 1);
        assert_eq!(snap.converged, 1);
        assert_eq!(snap.failed, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = QueryMetrics::new();
        metrics.increment_cancelled();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["cancelled"], 1);
    }
}
