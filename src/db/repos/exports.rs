use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db::error::DbResult,
    models::{ExportRecord, NewAuditEntry, StatusCounts},
};

/// Persistence for export records.
///
/// Every write takes the audit entry describing it. Implementations commit
/// the record change and the entry atomically: either both are stored or
/// neither is.
#[async_trait]
pub trait ExportRepo: Send + Sync {
    /// Insert a new record. Fails with `Conflict` if the id already exists.
    async fn insert(&self, record: &ExportRecord, audit: NewAuditEntry) -> DbResult<()>;

    /// Get a record by ID, including deleted records.
    async fn get(&self, id: &str) -> DbResult<Option<ExportRecord>>;

    /// Overwrite the mutable columns of an existing record.
    ///
    /// Returns `NotFound` if no row has the record's id.
    async fn update(&self, record: &ExportRecord, audit: NewAuditEntry) -> DbResult<()>;

    /// All records that still have a backing file, oldest expiration first.
    async fn list_live(&self) -> DbResult<Vec<ExportRecord>>;

    /// Live records whose expiration is at or before `now`, oldest
    /// expiration first.
    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: Option<i64>,
    ) -> DbResult<Vec<ExportRecord>>;

    /// Number of records per stored status.
    async fn count_by_status(&self) -> DbResult<StatusCounts>;
}
