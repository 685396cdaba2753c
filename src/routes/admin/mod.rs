//! Admin API for operators: lifecycle status and forced runs, export lookup
//! and extension, retention policy management, and the audit trail.

mod audit_entries;
pub mod error;
mod exports;
mod lifecycle;
mod retention_policies;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::AppState;

/// Routes mounted under `/admin`.
pub fn get_admin_routes() -> Router<AppState> {
    Router::new()
        // Lifecycle
        .route("/v1/lifecycle/status", get(lifecycle::status))
        .route("/v1/lifecycle/maintenance", post(lifecycle::run_maintenance))
        .route(
            "/v1/lifecycle/emergency-cleanup",
            post(lifecycle::run_emergency_cleanup),
        )
        // Exports
        .route("/v1/exports/{id}", get(exports::get))
        .route("/v1/exports/{id}/extend", post(exports::extend))
        // Retention policies
        .route("/v1/retention-policies", get(retention_policies::list))
        .route(
            "/v1/retention-policies/{policy_type}/{policy_key}",
            put(retention_policies::upsert).delete(retention_policies::delete),
        )
        // Audit trail
        .route("/v1/audit-entries", get(audit_entries::list))
}
