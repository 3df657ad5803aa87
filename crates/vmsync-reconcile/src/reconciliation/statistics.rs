//! Run statistics tracking for reconciliation.
//!
//! Tracks and aggregates per-record outcomes during a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use super::types::RecordOutcome;

/// Statistics for a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Total number of source records to process.
    #[serde(default)]
    pub total: u32,
    /// Number of source records processed so far.
    #[serde(default)]
    pub processed: u32,
    #[serde(default)]
    pub created: u32,
    #[serde(default)]
    pub updated: u32,
    /// Records moved from another cluster and updated.
    #[serde(default)]
    pub reassigned: u32,
    #[serde(default)]
    pub skipped: u32,
    #[serde(default)]
    pub failed: u32,
    /// Registry records marked orphaned after the record loop.
    #[serde(default)]
    pub orphaned: u32,
    /// Total duration in seconds.
    #[serde(default)]
    pub duration_seconds: u64,
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed {}/{}: created={} updated={} reassigned={} skipped={} failed={} orphaned={} in {}s",
            self.processed,
            self.total,
            self.created,
            self.updated,
            self.reassigned,
            self.skipped,
            self.failed,
            self.orphaned,
            self.duration_seconds
        )
    }
}

/// Thread-safe tracker for accumulating statistics during a run.
pub struct StatisticsTracker {
    total: AtomicU32,
    processed: AtomicU32,
    created: AtomicU32,
    updated: AtomicU32,
    reassigned: AtomicU32,
    skipped: AtomicU32,
    failed: AtomicU32,
    orphaned: AtomicU32,
    /// Start time for duration calculation.
    start_time: Instant,
}

impl StatisticsTracker {
    /// Create a tracker for a run over `total` source records.
    #[must_use]
    pub fn with_total(total: u32) -> Self {
        Self {
            total: AtomicU32::new(total),
            processed: AtomicU32::new(0),
            created: AtomicU32::new(0),
            updated: AtomicU32::new(0),
            reassigned: AtomicU32::new(0),
            skipped: AtomicU32::new(0),
            failed: AtomicU32::new(0),
            orphaned: AtomicU32::new(0),
            start_time: Instant::now(),
        }
    }

    /// Count one processed record under its outcome.
    pub fn record(&self, outcome: &RecordOutcome) {
        self.processed.fetch_add(1, Ordering::SeqCst);
        let counter = match outcome {
            RecordOutcome::Created => &self.created,
            RecordOutcome::Updated => &self.updated,
            RecordOutcome::ReassignedAndUpdated => &self.reassigned,
            RecordOutcome::Skipped(_) => &self.skipped,
            RecordOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Count a registry record marked orphaned.
    pub fn record_orphaned(&self) {
        self.orphaned.fetch_add(1, Ordering::SeqCst);
    }

    /// Count a failure outside the per-record loop.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn elapsed_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Snapshot current statistics.
    pub fn snapshot(&self) -> RunStatistics {
        RunStatistics {
            total: self.total.load(Ordering::SeqCst),
            processed: self.processed.load(Ordering::SeqCst),
            created: self.created.load(Ordering::SeqCst),
            updated: self.updated.load(Ordering::SeqCst),
            reassigned: self.reassigned.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            orphaned: self.orphaned.load(Ordering::SeqCst),
            duration_seconds: self.elapsed_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_statistics_default() {
        let stats = RunStatistics::default();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn test_statistics_tracker_outcomes() {
        let tracker = StatisticsTracker::with_total(6);

        tracker.record(&RecordOutcome::Created);
        tracker.record(&RecordOutcome::Created);
        tracker.record(&RecordOutcome::Updated);
        tracker.record(&RecordOutcome::ReassignedAndUpdated);
        tracker.record(&RecordOutcome::Skipped("empty name".into()));
        tracker.record(&RecordOutcome::Failed("no site".into()));
        tracker.record_orphaned();

        let stats = tracker.snapshot();
        assert_eq!(stats.total, 6);
        assert_eq!(stats.processed, 6);
        assert_eq!(stats.created, 2);
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.reassigned, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.orphaned, 1);
    }

    #[test]
    fn test_orphan_failures_do_not_count_as_processed() {
        let tracker = StatisticsTracker::with_total(1);
        tracker.record_failure();
        let stats = tracker.snapshot();
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_statistics_display() {
        let stats = RunStatistics {
            total: 2,
            processed: 2,
            created: 1,
            updated: 1,
            ..Default::default()
        };
        assert_eq!(
            stats.to_string(),
            "processed 2/2: created=1 updated=1 reassigned=0 skipped=0 failed=0 orphaned=0 in 0s"
        );
    }
}
