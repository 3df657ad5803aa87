//! Reconciliation report generation.
//!
//! Every run produces a report with its statistics and one entry per source
//! record. The run coordinator keeps the last one for status queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::statistics::RunStatistics;
use super::types::RecordOutcome;

/// Outcome for one source record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReport {
    /// Source-side identifier.
    pub source_id: String,
    pub name: String,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
}

/// Complete reconciliation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub statistics: RunStatistics,
    /// Per-record outcomes in processing order.
    pub records: Vec<RecordReport>,
    /// Registry records marked orphaned.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub orphaned: Vec<String>,
}

impl ReconciliationReport {
    /// Outcome recorded for the first source record with this name.
    #[must_use]
    pub fn outcome_for(&self, name: &str) -> Option<&RecordOutcome> {
        self.records
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.outcome)
    }

    /// Human-readable log of the run, one line per event.
    #[must_use]
    pub fn log_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.records.len() + self.orphaned.len() + 2);
        lines.push(format!(
            "Run {} started at {}",
            self.run_id,
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        ));
        for record in &self.records {
            lines.push(format!("{} ({}): {}", record.name, record.source_id, record.outcome));
        }
        for name in &self.orphaned {
            lines.push(format!("{name}: orphaned"));
        }
        lines.push(format!(
            "Run {} finished at {}: {}",
            self.run_id,
            self.finished_at.format("%Y-%m-%d %H:%M:%S"),
            self.statistics
        ));
        lines
    }
}
