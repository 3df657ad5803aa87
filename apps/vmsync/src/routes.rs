//! Trigger and status endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use vmsync_reconcile::reconciliation::{RunCoordinator, RunStatus, TriggerResult};

use crate::error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RunCoordinator>,
}

/// Body of an accepted trigger.
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub status: &'static str,
}

/// Create the service routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/trigger_sync", post(trigger_sync))
        .route("/status", get(status))
        .route("/health", get(health))
        .with_state(state)
}

/// Start a run in the background. 409 when one is already running.
async fn trigger_sync(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    match state.coordinator.trigger() {
        TriggerResult::Accepted => {
            info!("Reconciliation triggered over HTTP");
            Ok((
                StatusCode::ACCEPTED,
                Json(TriggerResponse { status: "accepted" }),
            ))
        }
        TriggerResult::Rejected => Err(ApiError::AlreadyRunning),
    }
}

async fn status(State(state): State<AppState>) -> Json<RunStatus> {
    Json(state.coordinator.status())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}
