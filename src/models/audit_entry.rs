use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ExportRecord, ExportStatus};

/// Lifecycle action recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// An export artifact was registered
    Created,
    /// An export was downloaded
    Accessed,
    /// Status moved between active and expiring
    StatusChanged,
    /// Status moved to expired
    Expired,
    /// The backing file was removed and the record marked deleted
    Evicted,
    /// The retention clock was reset
    Extended,
    /// A retention policy was created, changed or deactivated
    PolicyChanged,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::Created => write!(f, "created"),
            AuditAction::Accessed => write!(f, "accessed"),
            AuditAction::StatusChanged => write!(f, "status_changed"),
            AuditAction::Expired => write!(f, "expired"),
            AuditAction::Evicted => write!(f, "evicted"),
            AuditAction::Extended => write!(f, "extended"),
            AuditAction::PolicyChanged => write!(f, "policy_changed"),
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(AuditAction::Created),
            "accessed" => Ok(AuditAction::Accessed),
            "status_changed" => Ok(AuditAction::StatusChanged),
            "expired" => Ok(AuditAction::Expired),
            "evicted" => Ok(AuditAction::Evicted),
            "extended" => Ok(AuditAction::Extended),
            "policy_changed" => Ok(AuditAction::PolicyChanged),
            _ => Err(format!("Invalid audit action: {}", s)),
        }
    }
}

/// An immutable audit trail entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// Insertion sequence; strictly increasing across the whole table
    pub seq: i64,
    /// Unique identifier for this entry
    pub id: Uuid,
    /// Export the entry refers to (None for policy changes)
    pub export_id: Option<String>,
    pub action: AuditAction,
    pub old_status: Option<ExportStatus>,
    pub new_status: Option<ExportStatus>,
    /// Retention period in effect after the action
    pub retention_days: Option<u32>,
    /// Artifact size in bytes at the time of the action
    pub file_size: Option<u64>,
    /// Free-text reason (e.g. "expired", "emergency", "policy csv=14")
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Input for appending an audit entry
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub export_id: Option<String>,
    pub action: AuditAction,
    pub old_status: Option<ExportStatus>,
    pub new_status: Option<ExportStatus>,
    pub retention_days: Option<u32>,
    pub file_size: Option<u64>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NewAuditEntry {
    /// Build an entry describing `record` after `action`, moving from `old_status`.
    pub fn for_record(
        action: AuditAction,
        record: &ExportRecord,
        old_status: Option<ExportStatus>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            export_id: Some(record.id.clone()),
            action,
            old_status,
            new_status: Some(record.status),
            retention_days: Some(record.retention_days),
            file_size: Some(record.size_bytes),
            reason: None,
            timestamp,
        }
    }

    /// Build a policy change entry not tied to any export.
    pub fn policy_changed(
        reason: impl Into<String>,
        retention_days: Option<u32>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            export_id: None,
            action: AuditAction::PolicyChanged,
            old_status: None,
            new_status: None,
            retention_days,
            file_size: None,
            reason: Some(reason.into()),
            timestamp,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Query parameters for listing audit entries
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditEntryQuery {
    /// Filter by export ID
    pub export_id: Option<String>,
    /// Filter by action
    pub action: Option<AuditAction>,
    /// Start of time range (inclusive)
    pub from: Option<DateTime<Utc>>,
    /// End of time range (exclusive)
    pub to: Option<DateTime<Utc>>,
    /// Only entries with a sequence number greater than this
    pub after_seq: Option<i64>,
    /// Maximum number of results to return
    pub limit: Option<i64>,
}
