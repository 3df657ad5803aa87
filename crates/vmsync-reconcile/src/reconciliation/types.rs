//! Reconciliation type definitions.
//!
//! Outcome, lifecycle and run-state enums shared by the engine, the run
//! coordinator and the service binary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Terminal outcome for one source record within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum RecordOutcome {
    /// A new registry record was created.
    Created,
    /// The matching registry record was updated in place.
    Updated,
    /// A same-named record under another cluster was moved and updated.
    ReassignedAndUpdated,
    /// The record was not processed.
    Skipped(String),
    /// Processing failed; the run continued with the next record.
    Failed(String),
}

impl RecordOutcome {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Created => "created",
            RecordOutcome::Updated => "updated",
            RecordOutcome::ReassignedAndUpdated => "reassigned_and_updated",
            RecordOutcome::Skipped(_) => "skipped",
            RecordOutcome::Failed(_) => "failed",
        }
    }

    /// Check if the record ended in a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, RecordOutcome::Failed(_))
    }

    /// Reason attached to a skip or failure.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            RecordOutcome::Skipped(reason) | RecordOutcome::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for RecordOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}: {}", self.as_str(), reason),
            None => write!(f, "{}", self.as_str()),
        }
    }
}

/// Whether the network binder may create a missing interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// Record was just created: create the interface if missing.
    Create,
    /// Existing record: only reuse an interface that already exists.
    Update,
}

/// Mutually exclusive lifecycle tags carried by registry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleTag {
    /// Record is kept in sync with the source.
    Synced,
    /// Record is no longer present in the source.
    Orphaned,
}

impl LifecycleTag {
    /// Registry tag name.
    #[must_use]
    pub fn tag_name(&self) -> &'static str {
        match self {
            LifecycleTag::Synced => "SYNC_FROM_VCENTER",
            LifecycleTag::Orphaned => "ORPHANED_FROM_SYNC",
        }
    }

    /// The tag this one replaces.
    #[must_use]
    pub fn other(&self) -> Self {
        match self {
            LifecycleTag::Synced => LifecycleTag::Orphaned,
            LifecycleTag::Orphaned => LifecycleTag::Synced,
        }
    }
}

impl fmt::Display for LifecycleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag_name())
    }
}

/// Result of applying a lifecycle tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The tag was already present; nothing was written.
    Unchanged,
    /// The tag was added to an untagged record.
    Added,
    /// The other lifecycle tag was removed and this one added.
    Replaced,
}

/// What to do with registry records the source no longer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Leave them alone.
    #[default]
    Ignore,
    /// Tag synced records as orphaned and mark them failed.
    Tag,
}

impl OrphanPolicy {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OrphanPolicy::Ignore => "ignore",
            OrphanPolicy::Tag => "tag",
        }
    }
}

impl fmt::Display for OrphanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrphanPolicy {
    type Err = ParseOrphanPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ignore" => Ok(OrphanPolicy::Ignore),
            "tag" => Ok(OrphanPolicy::Tag),
            _ => Err(ParseOrphanPolicyError(s.to_string())),
        }
    }
}

/// Error parsing an orphan policy from string.
#[derive(Debug, Clone)]
pub struct ParseOrphanPolicyError(String);

impl fmt::Display for ParseOrphanPolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid orphan policy '{}', expected one of: ignore, tag",
            self.0
        )
    }
}

impl std::error::Error for ParseOrphanPolicyError {}

/// State of the run coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// No run has happened yet.
    #[default]
    Idle,
    /// A run is in progress.
    Running,
    /// The last run completed.
    Succeeded,
    /// The last run aborted.
    Failed,
}

impl RunState {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
