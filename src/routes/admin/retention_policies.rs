use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use super::error::AdminError;
use crate::{
    AppState,
    models::{PolicyType, RetentionPolicy, UpsertRetentionPolicy},
};

#[derive(Debug, Default, Deserialize)]
pub struct ListPoliciesQuery {
    /// Also return deactivated policies
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Serialize)]
pub struct RetentionPolicyListResponse {
    pub data: Vec<RetentionPolicy>,
}

fn parse_policy_type(raw: &str) -> Result<PolicyType, AdminError> {
    raw.parse::<PolicyType>().map_err(AdminError::BadRequest)
}

/// List retention policies
#[tracing::instrument(name = "admin.retention_policies.list", skip(state))]
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListPoliciesQuery>,
) -> Result<Json<RetentionPolicyListResponse>, AdminError> {
    let data = state.services.policies.list(!query.include_inactive).await?;
    Ok(Json(RetentionPolicyListResponse { data }))
}

/// Create or replace a retention policy
#[tracing::instrument(name = "admin.retention_policies.upsert", skip(state, input))]
pub async fn upsert(
    State(state): State<AppState>,
    Path((policy_type, policy_key)): Path<(String, String)>,
    Json(input): Json<UpsertRetentionPolicy>,
) -> Result<Json<RetentionPolicy>, AdminError> {
    let policy_type = parse_policy_type(&policy_type)?;
    let policy = state
        .services
        .policies
        .set_policy(policy_type, &policy_key, input)
        .await?;
    Ok(Json(policy))
}

/// Deactivate a retention policy
#[tracing::instrument(name = "admin.retention_policies.delete", skip(state))]
pub async fn delete(
    State(state): State<AppState>,
    Path((policy_type, policy_key)): Path<(String, String)>,
) -> Result<StatusCode, AdminError> {
    let policy_type = parse_policy_type(&policy_type)?;
    state
        .services
        .policies
        .deactivate_policy(policy_type, &policy_key)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
