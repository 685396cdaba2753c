use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{AuditEntry, AuditEntryQuery, NewAuditEntry},
};

/// Append-only access to the audit trail. There is no update or delete.
#[async_trait]
pub trait AuditEntryRepo: Send + Sync {
    /// Append an entry on its own.
    async fn append(&self, entry: NewAuditEntry) -> DbResult<AuditEntry>;

    /// List entries in insertion order, filtered by `query`.
    async fn list(&self, query: AuditEntryQuery) -> DbResult<Vec<AuditEntry>>;

    /// All entries for one export in insertion order.
    async fn list_for_export(&self, export_id: &str) -> DbResult<Vec<AuditEntry>>;

    /// Check that the audit table is reachable.
    async fn health_check(&self) -> DbResult<()>;
}
