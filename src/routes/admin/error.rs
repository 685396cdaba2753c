use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    db::DbError,
    jobs::SchedulerError,
    services::{LifecycleError, PolicyError},
};

/// Error body: `{"error": {"type": "...", "message": "..."}}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorInfo {
                error_type: error_type.into(),
                message: message.into(),
            },
        }
    }
}

#[derive(Debug)]
pub enum AdminError {
    NotFound(String),
    Conflict(String),
    Validation(String),
    BadRequest(String),
    /// A dependency needed to act safely is down
    Unavailable(String),
    Database(DbError),
    Internal(String),
}

impl From<DbError> for AdminError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => AdminError::NotFound("Resource not found".to_string()),
            DbError::Conflict(msg) => AdminError::Conflict(msg),
            DbError::Validation(msg) => AdminError::Validation(msg),
            err if err.is_audit_failure() => {
                tracing::error!(error = %err, "Audit trail unavailable");
                AdminError::Unavailable("Audit trail unavailable".to_string())
            }
            _ => AdminError::Database(err),
        }
    }
}

impl From<LifecycleError> for AdminError {
    fn from(err: LifecycleError) -> Self {
        match err {
            // Deleted records are indistinguishable from unknown ones
            LifecycleError::NotFound(_) | LifecycleError::AlreadyDeleted(_) => {
                AdminError::NotFound("Export not found".to_string())
            }
            LifecycleError::InvalidArtifact(msg) | LifecycleError::InvalidExtension(msg) => {
                AdminError::Validation(msg)
            }
            LifecycleError::NotEligible { .. } => {
                AdminError::Conflict("Export is not eligible for eviction".to_string())
            }
            LifecycleError::AuditUnavailable(e) => {
                tracing::error!(error = %e, "Audit trail unavailable");
                AdminError::Unavailable("Audit trail unavailable".to_string())
            }
            LifecycleError::EvictionFailed { id, source } => {
                AdminError::Internal(format!("eviction of {} failed: {}", id, source))
            }
            LifecycleError::Store(e) => AdminError::Database(e),
        }
    }
}

impl From<PolicyError> for AdminError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Invalid(msg) => AdminError::Validation(msg),
            PolicyError::NotFound => {
                AdminError::NotFound("Retention policy not found".to_string())
            }
            PolicyError::Store(e) => e.into(),
        }
    }
}

impl From<SchedulerError> for AdminError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Busy(job) => AdminError::Conflict(format!("{} is already running", job)),
            SchedulerError::Lifecycle(e) => e.into(),
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AdminError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AdminError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AdminError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            AdminError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AdminError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
            AdminError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "An internal database error occurred".to_string(),
                )
            }
            AdminError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}
