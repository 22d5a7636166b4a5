use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing admission and execution activity.
#[derive(Default)]
pub struct JobMetrics {
    submitted: AtomicU64,
    deduplicated: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl JobMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// A submission started a fresh job.
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// A submission matched an in-flight fingerprint and was folded into it.
    pub fn record_deduplicated(&self) {
        self.deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a terminal outcome.
    pub fn record_completion(&self, success: bool) {
        let counter = if success {
            &self.succeeded
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.submitted.load(Ordering::Relaxed),
            jobs_deduplicated: self.deduplicated.load(Ordering::Relaxed),
            jobs_succeeded: self.succeeded.load(Ordering::Relaxed),
            jobs_failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of job counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetricsSnapshot {
    /// Jobs started since process start.
    pub jobs_submitted: u64,
    /// Submissions answered with an existing correlation id.
    pub jobs_deduplicated: u64,
    /// Jobs whose work returned a payload.
    pub jobs_succeeded: u64,
    /// Jobs whose work returned an error or panicked.
    pub jobs_failed: u64,
}

impl MetricsSnapshot {
    /// Jobs started but not yet completed, as seen by this process.
    pub fn in_flight(&self) -> u64 {
        self.jobs_submitted
            .saturating_sub(self.jobs_succeeded + self.jobs_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_submissions_and_outcomes() {
        let metrics = JobMetrics::new();
        metrics.record_submitted();
        metrics.record_submitted();
        metrics.record_deduplicated();
        metrics.record_completion(true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_submitted, 2);
        assert_eq!(snapshot.jobs_deduplicated, 1);
        assert_eq!(snapshot.jobs_succeeded, 1);
        assert_eq!(snapshot.jobs_failed, 0);
        assert_eq!(snapshot.in_flight(), 1);
    }

    #[test]
    fn snapshot_is_consistent() {
        let metrics = JobMetrics::new();
        metrics.record_completion(false);
        assert_eq!(metrics.snapshot().jobs_failed, 1);
        assert_eq!(metrics.snapshot().in_flight(), 0);
    }
}
