//! Registry enum definitions
//!
//! Status values the registry accepts for virtual machine records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operational status of a virtual machine record in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    /// VM is running
    #[default]
    Active,
    /// VM is powered off
    Offline,
    /// VM is in a failed state (also used for orphaned records)
    Failed,
    /// VM is planned but not yet deployed
    Planned,
    /// VM is staged for deployment
    Staged,
    /// VM is being decommissioned
    Decommissioning,
}

impl VmStatus {
    /// Map a source power state onto a registry status.
    ///
    /// `poweredOn` maps to active, `poweredOff` to offline; anything else
    /// (suspended, unknown) defaults to active.
    #[must_use]
    pub fn from_power_state(power_state: &str) -> Self {
        match power_state {
            "poweredOn" => VmStatus::Active,
            "poweredOff" => VmStatus::Offline,
            _ => VmStatus::Active,
        }
    }

    /// Get the string representation used on the registry API.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            VmStatus::Active => "active",
            VmStatus::Offline => "offline",
            VmStatus::Failed => "failed",
            VmStatus::Planned => "planned",
            VmStatus::Staged => "staged",
            VmStatus::Decommissioning => "decommissioning",
        }
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VmStatus {
    type Err = ParseVmStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(VmStatus::Active),
            "offline" => Ok(VmStatus::Offline),
            "failed" => Ok(VmStatus::Failed),
            "planned" => Ok(VmStatus::Planned),
            "staged" => Ok(VmStatus::Staged),
            "decommissioning" => Ok(VmStatus::Decommissioning),
            _ => Err(ParseVmStatusError(s.to_string())),
        }
    }
}

/// Error parsing VM status from string.
#[derive(Debug, Clone)]
pub struct ParseVmStatusError(String);

impl fmt::Display for ParseVmStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid vm status '{}', expected one of: active, offline, failed, planned, staged, decommissioning",
            self.0
        )
    }
}

impl std::error::Error for ParseVmStatusError {}
