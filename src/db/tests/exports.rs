//! Shared tests for ExportRepo implementations

use chrono::Duration;

use super::harness::{record_at, t0};
use crate::{
    db::{
        error::DbError,
        repos::{AuditEntryRepo, ExportRepo},
    },
    models::{AuditAction, ExportFormat, ExportStatus, NewAuditEntry},
};

pub struct ExportTestContext<'a> {
    pub export_repo: &'a dyn ExportRepo,
    pub audit_repo: &'a dyn AuditEntryRepo,
}

fn created(record: &crate::models::ExportRecord) -> NewAuditEntry {
    NewAuditEntry::for_record(AuditAction::Created, record, None, record.created_at)
}

// ============================================================================
// Insert / Get
// ============================================================================

pub async fn test_insert_and_get(ctx: &ExportTestContext<'_>) {
    let record = record_at("exp-1", ExportFormat::Csv, 2048, t0(), 7);
    ctx.export_repo
        .insert(&record, created(&record))
        .await
        .expect("Failed to insert");

    let fetched = ctx
        .export_repo
        .get("exp-1")
        .await
        .expect("Failed to get")
        .expect("Record should exist");

    assert_eq!(fetched, record);
}

pub async fn test_get_missing(ctx: &ExportTestContext<'_>) {
    let fetched = ctx.export_repo.get("nope").await.expect("Failed to get");
    assert!(fetched.is_none());
}

pub async fn test_insert_writes_audit_entry(ctx: &ExportTestContext<'_>) {
    let record = record_at("exp-1", ExportFormat::Json, 10, t0(), 7);
    ctx.export_repo
        .insert(&record, created(&record))
        .await
        .unwrap();

    let entries = ctx.audit_repo.list_for_export("exp-1").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::Created);
    assert_eq!(entries[0].new_status, Some(ExportStatus::Active));
    assert_eq!(entries[0].retention_days, Some(7));
    assert_eq!(entries[0].file_size, Some(10));
}

pub async fn test_duplicate_id_conflicts(ctx: &ExportTestContext<'_>) {
    let record = record_at("exp-1", ExportFormat::Csv, 10, t0(), 7);
    ctx.export_repo
        .insert(&record, created(&record))
        .await
        .unwrap();

    let err = ctx
        .export_repo
        .insert(&record, created(&record))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Conflict(_)));

    // The rejected insert must not leave an audit entry behind
    let entries = ctx.audit_repo.list_for_export("exp-1").await.unwrap();
    assert_eq!(entries.len(), 1);
}

// ============================================================================
// Update
// ============================================================================

pub async fn test_update_persists_mutable_fields(ctx: &ExportTestContext<'_>) {
    let mut record = record_at("exp-1", ExportFormat::Excel, 10, t0(), 14);
    ctx.export_repo
        .insert(&record, created(&record))
        .await
        .unwrap();

    let accessed_at = t0() + Duration::hours(3);
    record.download_count = 4;
    record.last_accessed_at = Some(accessed_at);
    record.status = ExportStatus::Expiring;
    ctx.export_repo
        .update(
            &record,
            NewAuditEntry::for_record(
                AuditAction::Accessed,
                &record,
                Some(ExportStatus::Active),
                accessed_at,
            ),
        )
        .await
        .expect("Failed to update");

    let fetched = ctx.export_repo.get("exp-1").await.unwrap().unwrap();
    assert_eq!(fetched.download_count, 4);
    assert_eq!(fetched.last_accessed_at, Some(accessed_at));
    assert_eq!(fetched.status, ExportStatus::Expiring);

    let entries = ctx.audit_repo.list_for_export("exp-1").await.unwrap();
    let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::Created, AuditAction::Accessed]);
}

pub async fn test_update_missing_is_not_found(ctx: &ExportTestContext<'_>) {
    let record = record_at("ghost", ExportFormat::Csv, 10, t0(), 7);
    let err = ctx
        .export_repo
        .update(&record, created(&record))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound));

    let entries = ctx.audit_repo.list_for_export("ghost").await.unwrap();
    assert!(entries.is_empty());
}

// ============================================================================
// Listing
// ============================================================================

pub async fn test_list_live_excludes_deleted(ctx: &ExportTestContext<'_>) {
    let a = record_at("a", ExportFormat::Csv, 10, t0(), 7);
    let b = record_at("b", ExportFormat::Csv, 10, t0(), 3);
    let mut c = record_at("c", ExportFormat::Csv, 10, t0(), 1);
    for r in [&a, &b, &c] {
        ctx.export_repo.insert(r, created(r)).await.unwrap();
    }
    c.status = ExportStatus::Deleted;
    ctx.export_repo
        .update(
            &c,
            NewAuditEntry::for_record(AuditAction::Evicted, &c, Some(ExportStatus::Active), t0()),
        )
        .await
        .unwrap();

    let live = ctx.export_repo.list_live().await.unwrap();
    let ids: Vec<_> = live.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a"]);
}

pub async fn test_list_expired_orders_by_expiration(ctx: &ExportTestContext<'_>) {
    let now = t0() + Duration::days(10);
    let late = record_at("late", ExportFormat::Csv, 10, t0() + Duration::days(2), 7);
    let early = record_at("early", ExportFormat::Csv, 10, t0(), 3);
    let fresh = record_at("fresh", ExportFormat::Csv, 10, t0() + Duration::days(9), 7);
    for r in [&late, &early, &fresh] {
        ctx.export_repo.insert(r, created(r)).await.unwrap();
    }

    let expired = ctx.export_repo.list_expired(now, None).await.unwrap();
    let ids: Vec<_> = expired.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["early", "late"]);

    let limited = ctx.export_repo.list_expired(now, Some(1)).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, "early");
}

pub async fn test_list_expired_boundary_is_inclusive(ctx: &ExportTestContext<'_>) {
    let record = record_at("edge", ExportFormat::Csv, 10, t0(), 7);
    ctx.export_repo
        .insert(&record, created(&record))
        .await
        .unwrap();

    let before = ctx
        .export_repo
        .list_expired(record.expires_at - Duration::seconds(1), None)
        .await
        .unwrap();
    assert!(before.is_empty());

    let at = ctx
        .export_repo
        .list_expired(record.expires_at, None)
        .await
        .unwrap();
    assert_eq!(at.len(), 1);
}

pub async fn test_count_by_status(ctx: &ExportTestContext<'_>) {
    let a = record_at("a", ExportFormat::Csv, 10, t0(), 7);
    let mut b = record_at("b", ExportFormat::Csv, 10, t0(), 7);
    b.status = ExportStatus::Expired;
    let mut c = record_at("c", ExportFormat::Csv, 10, t0(), 7);
    c.status = ExportStatus::Expired;
    for r in [&a, &b, &c] {
        ctx.export_repo.insert(r, created(r)).await.unwrap();
    }

    let counts = ctx.export_repo.count_by_status().await.unwrap();
    assert_eq!(counts.active, 1);
    assert_eq!(counts.expired, 2);
    assert_eq!(counts.deleted, 0);
    assert_eq!(counts.total(), 3);
}

mod sqlite_tests {
    use super::*;
    use crate::db::{
        sqlite::{SqliteAuditEntryRepo, SqliteExportRepo},
        tests::harness::{create_sqlite_pool, run_sqlite_migrations},
    };

    async fn create_repos() -> (SqliteExportRepo, SqliteAuditEntryRepo) {
        let pool = create_sqlite_pool().await;
        run_sqlite_migrations(&pool).await;
        (
            SqliteExportRepo::new(pool.clone()),
            SqliteAuditEntryRepo::new(pool),
        )
    }

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let (export_repo, audit_repo) = create_repos().await;
                let ctx = ExportTestContext {
                    export_repo: &export_repo,
                    audit_repo: &audit_repo,
                };
                super::$name(&ctx).await;
            }
        };
    }

    sqlite_test!(test_insert_and_get);
    sqlite_test!(test_get_missing);
    sqlite_test!(test_insert_writes_audit_entry);
    sqlite_test!(test_duplicate_id_conflicts);
    sqlite_test!(test_update_persists_mutable_fields);
    sqlite_test!(test_update_missing_is_not_found);
    sqlite_test!(test_list_live_excludes_deleted);
    sqlite_test!(test_list_expired_orders_by_expiration);
    sqlite_test!(test_list_expired_boundary_is_inclusive);
    sqlite_test!(test_count_by_status);
}
