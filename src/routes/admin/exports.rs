use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;

use super::error::AdminError;
use crate::{AppState, models::ExportRecord};

/// Body of an extend request.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtendRequest {
    /// New retention period counted from now. Omitted: recompute from the
    /// current policies and download count.
    #[serde(default)]
    pub days: Option<u32>,
}

/// Get an export record by ID
#[tracing::instrument(name = "admin.exports.get", skip(state))]
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExportRecord>, AdminError> {
    Ok(Json(state.services.exports.get(&id).await?))
}

/// Reset an export's retention clock
#[tracing::instrument(name = "admin.exports.extend", skip(state, body), fields(days = ?body.days))]
pub async fn extend(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ExtendRequest>,
) -> Result<Json<ExportRecord>, AdminError> {
    let record = state.services.exports.extend(&id, body.days).await?;
    Ok(Json(record))
}
