//! Shared tests for AuditEntryRepo implementations

use chrono::Duration;

use super::harness::t0;
use crate::{
    db::repos::AuditEntryRepo,
    models::{AuditAction, AuditEntryQuery, ExportStatus, NewAuditEntry},
};

fn entry(export_id: &str, action: AuditAction, minutes: i64) -> NewAuditEntry {
    NewAuditEntry {
        export_id: Some(export_id.to_string()),
        action,
        old_status: Some(ExportStatus::Active),
        new_status: Some(ExportStatus::Active),
        retention_days: Some(7),
        file_size: Some(512),
        reason: None,
        timestamp: t0() + Duration::minutes(minutes),
    }
}

pub async fn test_append_assigns_increasing_seq(repo: &dyn AuditEntryRepo) {
    let first = repo
        .append(entry("exp-1", AuditAction::Created, 0))
        .await
        .expect("Failed to append");
    let second = repo
        .append(entry("exp-1", AuditAction::Accessed, 0))
        .await
        .expect("Failed to append");

    assert!(second.seq > first.seq);
    assert_ne!(first.id, second.id);
}

pub async fn test_round_trips_all_fields(repo: &dyn AuditEntryRepo) {
    let input = NewAuditEntry {
        export_id: Some("exp-9".to_string()),
        action: AuditAction::Evicted,
        old_status: Some(ExportStatus::Expired),
        new_status: Some(ExportStatus::Deleted),
        retention_days: Some(3),
        file_size: Some(150 * 1024 * 1024),
        reason: Some("emergency".to_string()),
        timestamp: t0(),
    };
    let stored = repo.append(input.clone()).await.unwrap();

    let listed = repo.list_for_export("exp-9").await.unwrap();
    assert_eq!(listed.len(), 1);
    let got = &listed[0];
    assert_eq!(got.seq, stored.seq);
    assert_eq!(got.id, stored.id);
    assert_eq!(got.action, input.action);
    assert_eq!(got.old_status, input.old_status);
    assert_eq!(got.new_status, input.new_status);
    assert_eq!(got.retention_days, input.retention_days);
    assert_eq!(got.file_size, input.file_size);
    assert_eq!(got.reason.as_deref(), Some("emergency"));
    assert_eq!(got.timestamp, input.timestamp);
}

pub async fn test_policy_entry_without_export(repo: &dyn AuditEntryRepo) {
    repo.append(NewAuditEntry::policy_changed("format/csv = 14", Some(14), t0()))
        .await
        .unwrap();

    let entries = repo
        .list(AuditEntryQuery {
            action: Some(AuditAction::PolicyChanged),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].export_id.is_none());
    assert!(entries[0].old_status.is_none());
}

pub async fn test_list_filters(repo: &dyn AuditEntryRepo) {
    repo.append(entry("a", AuditAction::Created, 0)).await.unwrap();
    repo.append(entry("b", AuditAction::Created, 1)).await.unwrap();
    repo.append(entry("a", AuditAction::Accessed, 2)).await.unwrap();
    repo.append(entry("a", AuditAction::Extended, 3)).await.unwrap();

    let for_a = repo
        .list(AuditEntryQuery {
            export_id: Some("a".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    let actions: Vec<_> = for_a.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::Created,
            AuditAction::Accessed,
            AuditAction::Extended
        ]
    );

    let created = repo
        .list(AuditEntryQuery {
            action: Some(AuditAction::Created),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(created.len(), 2);

    let window = repo
        .list(AuditEntryQuery {
            from: Some(t0() + Duration::minutes(1)),
            to: Some(t0() + Duration::minutes(3)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(window.len(), 2);

    let after = repo
        .list(AuditEntryQuery {
            after_seq: Some(for_a[1].seq),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].action, AuditAction::Extended);

    let limited = repo
        .list(AuditEntryQuery {
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
}

pub async fn test_health_check(repo: &dyn AuditEntryRepo) {
    repo.health_check().await.expect("audit table should be reachable");
}

mod sqlite_tests {
    use super::*;
    use crate::db::{
        sqlite::SqliteAuditEntryRepo,
        tests::harness::{create_sqlite_pool, run_sqlite_migrations},
    };

    async fn create_repo() -> SqliteAuditEntryRepo {
        let pool = create_sqlite_pool().await;
        run_sqlite_migrations(&pool).await;
        SqliteAuditEntryRepo::new(pool)
    }

    macro_rules! sqlite_test {
        ($name:ident) => {
            #[tokio::test]
            async fn $name() {
                let repo = create_repo().await;
                super::$name(&repo).await;
            }
        };
    }

    sqlite_test!(test_append_assigns_increasing_seq);
    sqlite_test!(test_round_trips_all_fields);
    sqlite_test!(test_policy_entry_without_export);
    sqlite_test!(test_list_filters);
    sqlite_test!(test_health_check);

    #[tokio::test]
    async fn test_entries_cannot_be_modified() {
        let pool = create_sqlite_pool().await;
        run_sqlite_migrations(&pool).await;
        let repo = SqliteAuditEntryRepo::new(pool.clone());
        repo.append(entry("a", AuditAction::Created, 0)).await.unwrap();

        let update = sqlx::query("UPDATE audit_entries SET reason = 'tampered'")
            .execute(&pool)
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM audit_entries").execute(&pool).await;
        assert!(delete.is_err());
    }

    #[tokio::test]
    async fn test_health_check_fails_without_table() {
        let pool = create_sqlite_pool().await;
        run_sqlite_migrations(&pool).await;
        let repo = SqliteAuditEntryRepo::new(pool.clone());

        sqlx::query("DROP TABLE audit_entries")
            .execute(&pool)
            .await
            .unwrap();

        assert!(repo.health_check().await.is_err());
    }
}
