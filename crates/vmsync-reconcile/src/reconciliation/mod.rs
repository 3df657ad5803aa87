//! # Reconciliation Engine
//!
//! One-way convergence of registry VM records onto the source inventory.
//!
//! ## Overview
//!
//! The reconciliation engine provides:
//! - Matching by lowercased name within the resolved cluster, with
//!   reassignment of same-named records found under another cluster
//! - Cluster/site resolution with an `"Unknown"` fallback created on demand
//! - Interface and IP address convergence with first-write-wins primary election
//! - Mutually exclusive lifecycle tags (synced / orphaned)
//! - Custom-field projection of source timestamps
//! - Single-flight run coordination and scheduled runs
//! - Per-run reports with statistics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      ReconciliationEngine                           │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌───────────────┐    ┌───────────────┐    ┌───────────────┐        │
//! │  │    Cluster    │───►│    Network    │───►│ TagLifecycle  │        │
//! │  │   Resolver    │    │    Binder     │    │               │        │
//! │  └───────────────┘    └───────────────┘    └───────────────┘        │
//! │          │                    │                    │                │
//! │          ▼                    ▼                    ▼                │
//! │  ┌───────────────┐    ┌───────────────┐    ┌───────────────┐        │
//! │  │   Snapshot    │    │   Statistics  │    │    Report     │        │
//! │  │    Cache      │    │    Tracker    │    │               │        │
//! │  └───────────────┘    └───────────────┘    └───────────────┘        │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//!            ▲
//!            │ trigger() / run_now()
//!   ┌────────┴────────┐      ┌──────────────────┐
//!   │ RunCoordinator  │◄─────│ run_scheduler()  │
//!   └─────────────────┘      └──────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use vmsync_reconcile::reconciliation::{ReconciliationEngine, RunCoordinator, TriggerResult};
//!
//! let engine = ReconciliationEngine::new(source, registry);
//! let coordinator = Arc::new(RunCoordinator::new(engine));
//!
//! // Fire and forget
//! assert_eq!(coordinator.trigger(), TriggerResult::Accepted);
//!
//! // Later
//! let status = coordinator.status();
//! for line in status.last_run_log {
//!     println!("{line}");
//! }
//! ```

pub mod cluster;
pub mod coordinator;
pub mod custom_fields;
pub mod engine;
pub mod lifecycle;
pub mod network;
pub mod platform;
pub mod report;
pub mod scheduler;
pub mod snapshot;
pub mod statistics;
pub mod types;

// Re-export main types
pub use cluster::{ClusterMapping, ClusterResolver, MappingEntry, Placement, ResolutionError};
pub use coordinator::{RunCoordinator, RunStatus, TriggerResult};
pub use custom_fields::CustomFieldProjector;
pub use engine::{
    ReconciliationConfig, ReconciliationEngine, ReconciliationError, ReconciliationResult,
};
pub use lifecycle::TagLifecycle;
pub use network::{BindOutcome, NetworkBinder, INTERFACE_NAME};
pub use platform::{slugify, PlatformResolver};
pub use report::{ReconciliationReport, RecordReport};
pub use scheduler::{run_scheduler, ReconciliationScheduler, ScheduleConfig, ScheduleFrequency};
pub use snapshot::{SnapshotCache, SnapshotError};
pub use statistics::{RunStatistics, StatisticsTracker};
pub use types::{
    BindMode, LifecycleTag, OrphanPolicy, ParseOrphanPolicyError, RecordOutcome, RunState,
    Transition,
};
