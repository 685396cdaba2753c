use axum::{
    Json,
    extract::{Query, State},
};
use serde::Serialize;

use super::error::AdminError;
use crate::{
    AppState,
    models::{AuditEntry, AuditEntryQuery},
};

/// Largest page the endpoint returns.
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Serialize)]
pub struct AuditEntryListResponse {
    pub data: Vec<AuditEntry>,
    /// Pass as `after_seq` to fetch the next page
    pub next_seq: Option<i64>,
}

/// List audit entries, oldest first
#[tracing::instrument(name = "admin.audit_entries.list", skip(state))]
pub async fn list(
    State(state): State<AppState>,
    Query(mut query): Query<AuditEntryQuery>,
) -> Result<Json<AuditEntryListResponse>, AdminError> {
    let limit = query.limit.unwrap_or(100);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(AdminError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    query.limit = Some(limit);

    let data = state.services.audit.list(query).await?;
    let next_seq = if data.len() as i64 == limit {
        data.last().map(|e| e.seq)
    } else {
        None
    };

    Ok(Json(AuditEntryListResponse { data, next_seq }))
}
