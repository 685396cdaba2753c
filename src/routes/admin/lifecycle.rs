use axum::{Json, extract::State};

use super::error::AdminError;
use crate::{AppState, jobs::LifecycleStatus, retention::SweepReport};

/// Storage sample, record counts per status and the last run of each job.
#[tracing::instrument(name = "admin.lifecycle.status", skip(state))]
pub async fn status(State(state): State<AppState>) -> Result<Json<LifecycleStatus>, AdminError> {
    Ok(Json(state.scheduler.status().await?))
}

/// Run a full maintenance sweep now.
///
/// Returns 409 if a sweep is already running.
#[tracing::instrument(name = "admin.lifecycle.maintenance", skip(state))]
pub async fn run_maintenance(
    State(state): State<AppState>,
) -> Result<Json<SweepReport>, AdminError> {
    let report = state.scheduler.run_maintenance(&state.shutdown).await?;
    Ok(Json(report))
}

/// Run emergency cleanup now, whatever the current storage pressure.
#[tracing::instrument(name = "admin.lifecycle.emergency_cleanup", skip(state))]
pub async fn run_emergency_cleanup(
    State(state): State<AppState>,
) -> Result<Json<SweepReport>, AdminError> {
    tracing::warn!("Emergency cleanup requested through the admin API");
    let report = state.scheduler.run_emergency_cleanup(&state.shutdown).await?;
    Ok(Json(report))
}
