use std::sync::Arc;

use crate::{
    db::{DbPool, DbResult},
    models::{AuditEntry, AuditEntryQuery, NewAuditEntry},
    observability::metrics,
};

/// Service layer for the append-only audit trail.
///
/// Record mutations write their entries through the repositories in the same
/// transaction as the change. This service covers standalone entries, the
/// pre-flight check before file deletion, and compliance reads.
#[derive(Clone)]
pub struct AuditSink {
    db: Arc<DbPool>,
}

impl AuditSink {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Append a standalone entry.
    pub async fn record(&self, entry: NewAuditEntry) -> DbResult<AuditEntry> {
        let stored = self.db.audit_entries().append(entry).await.inspect_err(|e| {
            metrics::record_audit_failure();
            tracing::error!(error = %e, "Failed to write audit entry");
        })?;
        metrics::record_lifecycle_transition(&stored.action.to_string());
        Ok(stored)
    }

    /// Check that entries can currently be written.
    pub async fn ensure_available(&self) -> DbResult<()> {
        self.db.audit_entries().health_check().await.inspect_err(|e| {
            metrics::record_audit_failure();
            tracing::error!(error = %e, "Audit trail unavailable");
        })
    }

    /// List entries in insertion order
    pub async fn list(&self, query: AuditEntryQuery) -> DbResult<Vec<AuditEntry>> {
        self.db.audit_entries().list(query).await
    }

    /// All entries for one export in insertion order
    pub async fn list_for_export(&self, export_id: &str) -> DbResult<Vec<AuditEntry>> {
        self.db.audit_entries().list_for_export(export_id).await
    }
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use super::*;
    use crate::{
        db::tests::harness::{create_sqlite_pool, run_sqlite_migrations, t0},
        models::AuditAction,
    };

    #[tokio::test]
    async fn test_record_and_list() {
        let pool = create_sqlite_pool().await;
        run_sqlite_migrations(&pool).await;
        let sink = AuditSink::new(Arc::new(DbPool::from_sqlite(pool)));

        let first = sink
            .record(NewAuditEntry::policy_changed("format/csv = 14 days", Some(14), t0()))
            .await
            .unwrap();
        let second = sink
            .record(NewAuditEntry::policy_changed("format/csv deactivated", None, t0()))
            .await
            .unwrap();
        assert!(second.seq > first.seq);

        let entries = sink.list(AuditEntryQuery::default()).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.action == AuditAction::PolicyChanged));
        assert_eq!(entries[0].reason.as_deref(), Some("format/csv = 14 days"));
    }

    #[tokio::test]
    async fn test_unavailable_store_is_an_error() {
        let pool = create_sqlite_pool().await;
        run_sqlite_migrations(&pool).await;
        let sink = AuditSink::new(Arc::new(DbPool::from_sqlite(pool.clone())));
        assert!(sink.ensure_available().await.is_ok());

        sqlx::query("DROP TABLE audit_entries")
            .execute(&pool)
            .await
            .unwrap();

        assert!(sink.ensure_available().await.is_err());
        assert!(
            sink.record(NewAuditEntry::policy_changed("x", None, t0()))
                .await
                .is_err()
        );
    }
}
