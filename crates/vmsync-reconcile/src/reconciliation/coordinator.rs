//! Single-flight run coordination.
//!
//! Manual and scheduled triggers share one admission gate. A trigger that
//! arrives while a run is in progress is rejected, never queued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};

use super::engine::{ReconciliationEngine, ReconciliationError, ReconciliationResult};
use super::report::ReconciliationReport;
use super::statistics::RunStatistics;
use super::types::RunState;

/// Answer to a trigger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerResult {
    /// A run was started.
    Accepted,
    /// A run is already in progress.
    Rejected,
}

/// Externally visible coordinator state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStatus {
    pub state: RunState,
    /// When the last run finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_statistics: Option<RunStatistics>,
    #[serde(default)]
    pub last_run_log: Vec<String>,
}

/// Releases the gate when the run ends, even by panic.
struct GateGuard<'a>(&'a AtomicBool);

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the engine and admits at most one run at a time.
pub struct RunCoordinator {
    engine: Arc<ReconciliationEngine>,
    running: AtomicBool,
    status: RwLock<RunStatus>,
}

impl RunCoordinator {
    pub fn new(engine: ReconciliationEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            running: AtomicBool::new(false),
            status: RwLock::new(RunStatus::default()),
        }
    }

    /// Start a run in the background unless one is in progress.
    pub fn trigger(self: &Arc<Self>) -> TriggerResult {
        if !self.try_acquire() {
            warn!("Reconciliation already running, trigger rejected");
            return TriggerResult::Rejected;
        }

        info!("Reconciliation triggered");
        // Visible to status readers before the task is scheduled.
        self.update_status(|status| status.state = RunState::Running);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            // Outcome is recorded in the status.
            let _ = this.execute().await;
        });
        TriggerResult::Accepted
    }

    /// Run now and wait for the report.
    ///
    /// Fails with [`ReconciliationError::AlreadyRunning`] when the gate is held.
    pub async fn run_now(&self) -> ReconciliationResult<ReconciliationReport> {
        if !self.try_acquire() {
            return Err(ReconciliationError::AlreadyRunning);
        }
        self.execute().await
    }

    /// Check if a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current state and the last run's outcome.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
            .read()
            .map(|status| status.clone())
            .unwrap_or_default()
    }

    fn try_acquire(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Run the engine. The caller must hold the gate.
    async fn execute(&self) -> ReconciliationResult<ReconciliationReport> {
        let _gate = GateGuard(&self.running);
        self.update_status(|status| status.state = RunState::Running);

        let engine = Arc::clone(&self.engine);
        let result = match tokio::spawn(async move { engine.run().await }).await {
            Ok(result) => result,
            Err(e) => Err(ReconciliationError::Task(e.to_string())),
        };

        match &result {
            Ok(report) => {
                info!(run_id = %report.run_id, statistics = %report.statistics, "Run succeeded");
                self.update_status(|status| {
                    status.state = RunState::Succeeded;
                    status.last_run_at = Some(report.finished_at);
                    status.last_error = None;
                    status.last_statistics = Some(report.statistics.clone());
                    status.last_run_log = report.log_lines();
                });
            }
            Err(e) => {
                error!(error = %e, "Run failed");
                let message = e.to_string();
                self.update_status(|status| {
                    status.state = RunState::Failed;
                    status.last_run_at = Some(Utc::now());
                    status.last_run_log = vec![format!("Run failed: {message}")];
                    status.last_error = Some(message);
                    status.last_statistics = None;
                });
            }
        }
        result
    }

    fn update_status(&self, apply: impl FnOnce(&mut RunStatus)) {
        if let Ok(mut status) = self.status.write() {
            apply(&mut status);
        }
    }
}
