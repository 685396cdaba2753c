//! Lifecycle of export records.
//!
//! [`ExportRecordManager`] is the only writer of export records and the only
//! caller that removes artifact files. Every mutation is serialized per
//! record id and committed together with its audit entry.

use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{ArtifactStorageError, ArtifactStore, AuditSink, PolicyStore};
use crate::{
    clock::SharedClock,
    db::{DbError, DbPool},
    models::{
        AuditAction, ExportRecord, ExportStatus, NewAuditEntry, RegisterExport, StatusCounts,
    },
    observability::metrics,
    retention::{calculate, calculator::MAX_POLICY_DAYS},
};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Invalid artifact: {0}")]
    InvalidArtifact(String),

    #[error("Invalid extension: {0}")]
    InvalidExtension(String),

    #[error("Export not found: {0}")]
    NotFound(String),

    #[error("Export already deleted: {0}")]
    AlreadyDeleted(String),

    #[error("Export {id} is {status} and cannot be evicted without force")]
    NotEligible { id: String, status: ExportStatus },

    #[error("Failed to evict export {id}: {source}")]
    EvictionFailed {
        id: String,
        #[source]
        source: ArtifactStorageError,
    },

    #[error("Audit trail unavailable: {0}")]
    AuditUnavailable(#[source] DbError),

    #[error("Store error: {0}")]
    Store(#[from] DbError),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Classify a failed record write. A rejected audit entry escalates.
fn write_error(err: DbError) -> LifecycleError {
    if err.is_audit_failure() {
        metrics::record_audit_failure();
        tracing::error!(error = %err, "Audit trail unavailable, mutation rolled back");
        LifecycleError::AuditUnavailable(err)
    } else {
        LifecycleError::Store(err)
    }
}

/// Why an export is being evicted. Recorded as the audit reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
    /// Retention period elapsed
    Expired,
    /// Storage pressure cleanup
    Emergency,
}

impl EvictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictReason::Expired => "expired",
            EvictReason::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for EvictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful `evict` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictOutcome {
    Evicted { bytes_freed: u64 },
    /// The record was already deleted; nothing changed
    AlreadyDeleted,
}

impl EvictOutcome {
    pub fn bytes_freed(&self) -> u64 {
        match self {
            EvictOutcome::Evicted { bytes_freed } => *bytes_freed,
            EvictOutcome::AlreadyDeleted => 0,
        }
    }
}

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Exclusive hold on one record id. The map entry is dropped with the last holder.
struct RecordLock<'a> {
    locks: &'a LockMap,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RecordLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.id, |_, m| Arc::strong_count(m) == 1);
    }
}

pub struct ExportRecordManager {
    db: Arc<DbPool>,
    artifacts: Arc<dyn ArtifactStore>,
    policies: Arc<PolicyStore>,
    audit: AuditSink,
    clock: SharedClock,
    expiring_window: Duration,
    locks: LockMap,
}

impl ExportRecordManager {
    pub fn new(
        db: Arc<DbPool>,
        artifacts: Arc<dyn ArtifactStore>,
        policies: Arc<PolicyStore>,
        audit: AuditSink,
        clock: SharedClock,
        expiring_window: Duration,
    ) -> Self {
        Self {
            db,
            artifacts,
            policies,
            audit,
            clock,
            expiring_window,
            locks: DashMap::new(),
        }
    }

    /// Status `record` should have at the current time.
    pub fn derived_status(&self, record: &ExportRecord) -> ExportStatus {
        record.derive_status(self.clock.now(), self.expiring_window)
    }

    async fn lock(&self, id: &str) -> RecordLock<'_> {
        let mutex = self
            .locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        RecordLock {
            locks: &self.locks,
            id: id.to_string(),
            guard: Some(guard),
        }
    }

    async fn load(&self, id: &str) -> LifecycleResult<ExportRecord> {
        self.db
            .exports()
            .get(id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))
    }

    /// Commit `record` with the audit entry for `action`.
    async fn commit(
        &self,
        record: &ExportRecord,
        action: AuditAction,
        old_status: ExportStatus,
        reason: Option<String>,
    ) -> LifecycleResult<()> {
        let mut entry =
            NewAuditEntry::for_record(action, record, Some(old_status), self.clock.now());
        entry.reason = reason;
        self.db
            .exports()
            .update(record, entry)
            .await
            .map_err(write_error)?;
        metrics::record_lifecycle_transition(&action.to_string());
        Ok(())
    }

    /// Register a freshly written artifact.
    ///
    /// The retention period is computed from the current policy snapshot. The
    /// record starts `active` unless its period is shorter than the expiring
    /// window.
    #[tracing::instrument(skip(self, input), fields(format = %input.format, owner_id = %input.owner_id))]
    pub async fn register(&self, input: RegisterExport) -> LifecycleResult<ExportRecord> {
        let size_bytes = u64::try_from(input.size_bytes)
            .ok()
            .filter(|s| *s > 0)
            .ok_or_else(|| {
                LifecycleError::InvalidArtifact(format!(
                    "size must be positive, got {}",
                    input.size_bytes
                ))
            })?;
        if input.owner_id.trim().is_empty() {
            return Err(LifecycleError::InvalidArtifact("owner id is empty".into()));
        }

        match self.artifacts.size_of(&input.file_path).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(LifecycleError::InvalidArtifact(
                    "artifact file does not exist".into(),
                ));
            }
            Err(e) => {
                return Err(LifecycleError::InvalidArtifact(format!(
                    "artifact file is not readable: {}",
                    e
                )));
            }
        }

        let snapshot = self.policies.snapshot();
        let decision = calculate(
            &snapshot,
            input.format,
            size_bytes,
            &input.owner_role,
            0,
        );

        let now = self.clock.now();
        let mut record = ExportRecord {
            id: Uuid::new_v4().to_string(),
            file_path: input.file_path,
            format: input.format,
            size_bytes,
            owner_id: input.owner_id,
            owner_role: input.owner_role,
            created_at: now,
            last_accessed_at: None,
            download_count: 0,
            retention_days: decision.days,
            expires_at: now + Duration::days(i64::from(decision.days)),
            status: ExportStatus::Active,
        };
        record.status = record.derive_status(now, self.expiring_window);

        let mut entry = NewAuditEntry::for_record(AuditAction::Created, &record, None, now);
        if decision.used_default {
            tracing::debug!(
                format = %record.format,
                "No retention for format, using global default"
            );
            entry = entry.with_reason("format fell back to default retention");
        } else if decision.capped {
            entry = entry.with_reason("large file retention cap applied");
        }

        self.db
            .exports()
            .insert(&record, entry)
            .await
            .map_err(write_error)?;
        metrics::record_lifecycle_transition("created");

        tracing::info!(
            export_id = %record.id,
            size_bytes = record.size_bytes,
            retention_days = record.retention_days,
            expires_at = %record.expires_at,
            "Registered export"
        );
        Ok(record)
    }

    /// Count a download.
    #[tracing::instrument(skip(self))]
    pub async fn record_access(&self, id: &str) -> LifecycleResult<ExportRecord> {
        let _lock = self.lock(id).await;
        let mut record = self.load(id).await?;
        if record.status.is_deleted() {
            return Err(LifecycleError::NotFound(id.to_string()));
        }

        let old_status = record.status;
        record.download_count = record.download_count.saturating_add(1);
        record.last_accessed_at = Some(self.clock.now());
        self.commit(&record, AuditAction::Accessed, old_status, None)
            .await?;

        tracing::debug!(export_id = %id, download_count = record.download_count, "Recorded access");
        Ok(record)
    }

    /// Reset the retention clock so the export expires `days` from now.
    ///
    /// With `days = None` the period is recomputed from the current policy
    /// snapshot and the record's download count, so a popularity bonus
    /// earned since registration is picked up.
    #[tracing::instrument(skip(self))]
    pub async fn extend(&self, id: &str, days: Option<u32>) -> LifecycleResult<ExportRecord> {
        if let Some(d) = days
            && (d == 0 || i64::from(d) > MAX_POLICY_DAYS)
        {
            return Err(LifecycleError::InvalidExtension(format!(
                "days must be between 1 and {}, got {}",
                MAX_POLICY_DAYS, d
            )));
        }

        let _lock = self.lock(id).await;
        let mut record = self.load(id).await?;
        if record.status.is_deleted() {
            return Err(LifecycleError::AlreadyDeleted(id.to_string()));
        }

        let days = match days {
            Some(d) => d,
            None => {
                calculate(
                    &self.policies.snapshot(),
                    record.format,
                    record.size_bytes,
                    &record.owner_role,
                    record.download_count,
                )
                .days
            }
        };

        let now = self.clock.now();
        let old_status = record.status;
        record.expires_at = now + Duration::days(i64::from(days));
        record.retention_days = whole_days_between(record.created_at, record.expires_at);
        record.status = record.derive_status(now, self.expiring_window);
        self.commit(
            &record,
            AuditAction::Extended,
            old_status,
            Some(format!("extended by {} days", days)),
        )
        .await?;

        tracing::info!(
            export_id = %id,
            days,
            expires_at = %record.expires_at,
            "Extended export retention"
        );
        Ok(record)
    }

    /// Bring the stored status in line with the current time.
    ///
    /// A change is persisted with a `status_changed` entry, or `expired` when
    /// the record reached its expiration. Never deletes anything.
    #[tracing::instrument(skip(self))]
    pub async fn recompute_status(&self, id: &str) -> LifecycleResult<ExportStatus> {
        let _lock = self.lock(id).await;
        let mut record = self.load(id).await?;
        self.apply_derived_status(&mut record).await
    }

    async fn apply_derived_status(
        &self,
        record: &mut ExportRecord,
    ) -> LifecycleResult<ExportStatus> {
        let derived = record.derive_status(self.clock.now(), self.expiring_window);
        if derived == record.status {
            return Ok(derived);
        }

        let old_status = record.status;
        record.status = derived;
        let action = if derived == ExportStatus::Expired {
            AuditAction::Expired
        } else {
            AuditAction::StatusChanged
        };
        self.commit(record, action, old_status, None).await?;

        tracing::debug!(
            export_id = %record.id,
            old_status = %old_status,
            new_status = %derived,
            "Export status changed"
        );
        Ok(derived)
    }

    /// Remove the artifact and mark the record deleted.
    ///
    /// The record must be expired unless `force` is set. Deleting the file
    /// tolerates a file that is already gone, and the status update is the
    /// commit point: if it fails after the file is removed, a later call
    /// completes the eviction. Evicting a deleted record is a no-op.
    #[tracing::instrument(skip(self), fields(reason = %reason))]
    pub async fn evict(
        &self,
        id: &str,
        reason: EvictReason,
        force: bool,
    ) -> LifecycleResult<EvictOutcome> {
        let _lock = self.lock(id).await;
        let mut record = self.load(id).await?;
        if record.status.is_deleted() {
            return Ok(EvictOutcome::AlreadyDeleted);
        }

        let derived = record.derive_status(self.clock.now(), self.expiring_window);
        if derived != ExportStatus::Expired && !force {
            return Err(LifecycleError::NotEligible {
                id: id.to_string(),
                status: derived,
            });
        }

        self.audit
            .ensure_available()
            .await
            .map_err(LifecycleError::AuditUnavailable)?;

        if derived == ExportStatus::Expired {
            self.apply_derived_status(&mut record).await?;
        }

        if let Err(source) = self.artifacts.delete(&record.file_path).await {
            metrics::record_eviction_failure(reason.as_str());
            tracing::warn!(
                export_id = %id,
                error = %source,
                "Failed to delete export artifact, will retry on next sweep"
            );
            return Err(LifecycleError::EvictionFailed {
                id: id.to_string(),
                source,
            });
        }

        let old_status = record.status;
        record.status = ExportStatus::Deleted;
        self.commit(
            &record,
            AuditAction::Evicted,
            old_status,
            Some(reason.as_str().to_string()),
        )
        .await?;
        metrics::record_eviction(reason.as_str(), record.size_bytes);

        tracing::info!(
            export_id = %id,
            bytes_freed = record.size_bytes,
            "Evicted export"
        );
        Ok(EvictOutcome::Evicted {
            bytes_freed: record.size_bytes,
        })
    }

    pub async fn get(&self, id: &str) -> LifecycleResult<ExportRecord> {
        self.load(id).await
    }

    /// Records that still have a backing file, oldest expiration first.
    pub async fn live_records(&self) -> LifecycleResult<Vec<ExportRecord>> {
        Ok(self.db.exports().list_live().await?)
    }

    /// Live records past their expiration, oldest expiration first.
    pub async fn expired_records(&self, limit: Option<i64>) -> LifecycleResult<Vec<ExportRecord>> {
        Ok(self
            .db
            .exports()
            .list_expired(self.clock.now(), limit)
            .await?)
    }

    /// Number of records per stored status.
    pub async fn counts(&self) -> LifecycleResult<StatusCounts> {
        Ok(self.db.exports().count_by_status().await?)
    }
}

/// Whole days from `from` to `to`, rounded up, at least 1.
fn whole_days_between(from: chrono::DateTime<chrono::Utc>, to: chrono::DateTime<chrono::Utc>) -> u32 {
    let secs = (to - from).num_seconds().max(0);
    let days = (secs + 86_399) / 86_400;
    u32::try_from(days).unwrap_or(u32::MAX).max(1)
}
