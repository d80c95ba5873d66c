//! Counters for the dice client.
//!
//! All counters are backed by atomics for lock-free concurrent access.

use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregated metrics for roll submission and outcome correlation.
///
/// Thread-safe via atomics; shared as `Arc<Metrics>`.
pub struct Metrics {
    /// Rolls handed to the dispatcher.
    pub rolls_submitted: AtomicU64,
    /// Submissions that failed before a request id was known.
    pub submission_failures: AtomicU64,
    /// Waits resolved with an outcome.
    pub rolls_resolved: AtomicU64,
    /// Waits cancelled by the consumer (including dropped HTTP requests).
    pub rolls_cancelled: AtomicU64,
    /// Waits that hit their deadline.
    pub rolls_timed_out: AtomicU64,
    /// Outcomes observed before any wait was registered for them.
    pub events_unclaimed: AtomicU64,
    /// Redelivered outcomes, or outcomes for cancelled waits.
    pub events_dropped: AtomicU64,
    /// Sum of submit-to-outcome latencies in milliseconds.
    pub resolution_latency_sum_ms: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            rolls_submitted: AtomicU64::new(0),
            submission_failures: AtomicU64::new(0),
            rolls_resolved: AtomicU64::new(0),
            rolls_cancelled: AtomicU64::new(0),
            rolls_timed_out: AtomicU64::new(0),
            events_unclaimed: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            resolution_latency_sum_ms: AtomicU64::new(0),
        }
    }

    pub fn record_submission(&self) {
        self.rolls_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_failure(&self) {
        self.submission_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a resolved wait with its latency.
    pub fn record_resolution(&self, latency_ms: u64) {
        self.rolls_resolved.fetch_add(1, Ordering::Relaxed);
        self.resolution_latency_sum_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_cancellation(&self) {
        self.rolls_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// A timed-out wait is also counted as cancelled.
    pub fn record_timeout(&self) {
        self.rolls_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unclaimed_event(&self) {
        self.events_unclaimed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_event(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Average submit-to-outcome latency in milliseconds, or 0 if none.
    pub fn avg_latency_ms(&self) -> u64 {
        let count = self.rolls_resolved.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.resolution_latency_sum_ms.load(Ordering::Relaxed) / count
    }

    /// Serialize metrics as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "rolls_submitted": self.rolls_submitted.load(Ordering::Relaxed),
            "submission_failures": self.submission_failures.load(Ordering::Relaxed),
            "rolls_resolved": self.rolls_resolved.load(Ordering::Relaxed),
            "rolls_cancelled": self.rolls_cancelled.load(Ordering::Relaxed),
            "rolls_timed_out": self.rolls_timed_out.load(Ordering::Relaxed),
            "events_unclaimed": self.events_unclaimed.load(Ordering::Relaxed),
            "events_dropped": self.events_dropped.load(Ordering::Relaxed),
            "avg_resolution_latency_ms": self.avg_latency_ms(),
        })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
