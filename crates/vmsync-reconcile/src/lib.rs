//! # vmsync Reconciliation
//!
//! Converges a registry's virtual machine records onto an authoritative
//! source inventory. Collaborators are reached only through the traits in
//! `vmsync-connector`, so any source and registry implementation can be
//! plugged in.
//!
//! See [`reconciliation`] for the engine, run coordination and scheduling.

pub mod reconciliation;

pub use reconciliation::{
    ReconciliationConfig, ReconciliationEngine, ReconciliationError, ReconciliationReport,
    ReconciliationResult, RunCoordinator,
};
