use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::common::insert_audit_entry;
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::RetentionPolicyRepo,
    },
    models::{NewAuditEntry, PolicyType, RetentionPolicy, UpsertRetentionPolicy},
};

pub struct SqliteRetentionPolicyRepo {
    pool: SqlitePool,
}

impl SqliteRetentionPolicyRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Rows with an unrecognised policy type yield `None` so callers can skip them.
    fn parse_row(row: &SqliteRow) -> Option<RetentionPolicy> {
        let raw_type: String = row.get("policy_type");
        let policy_key: String = row.get("policy_key");
        let policy_type = match raw_type.parse::<PolicyType>() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(
                    policy_type = %raw_type,
                    policy_key = %policy_key,
                    error = %e,
                    "Skipping retention policy row with unknown type"
                );
                return None;
            }
        };

        Some(RetentionPolicy {
            policy_type,
            policy_key,
            retention_days: row.get("retention_days"),
            is_active: row.get("is_active"),
            description: row.get("description"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl RetentionPolicyRepo for SqliteRetentionPolicyRepo {
    async fn list(&self, active_only: bool) -> DbResult<Vec<RetentionPolicy>> {
        let sql = if active_only {
            "SELECT policy_type, policy_key, retention_days, is_active, description, updated_at \
             FROM retention_policies WHERE is_active = 1 ORDER BY policy_type, policy_key"
        } else {
            "SELECT policy_type, policy_key, retention_days, is_active, description, updated_at \
             FROM retention_policies ORDER BY policy_type, policy_key"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        Ok(rows.iter().filter_map(Self::parse_row).collect())
    }

    async fn get(
        &self,
        policy_type: PolicyType,
        policy_key: &str,
    ) -> DbResult<Option<RetentionPolicy>> {
        let row = sqlx::query(
            r#"
            SELECT policy_type, policy_key, retention_days, is_active, description, updated_at
            FROM retention_policies
            WHERE policy_type = ? AND policy_key = ?
            "#,
        )
        .bind(policy_type.to_string())
        .bind(policy_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().and_then(Self::parse_row))
    }

    async fn upsert(
        &self,
        policy_type: PolicyType,
        policy_key: &str,
        input: UpsertRetentionPolicy,
        audit: NewAuditEntry,
    ) -> DbResult<RetentionPolicy> {
        let updated_at = audit.timestamp;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO retention_policies (
                policy_type, policy_key, retention_days, is_active, description, updated_at
            )
            VALUES (?, ?, ?, 1, ?, ?)
            ON CONFLICT (policy_type, policy_key) DO UPDATE SET
                retention_days = excluded.retention_days,
                is_active = 1,
                description = excluded.description,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(policy_type.to_string())
        .bind(policy_key)
        .bind(input.retention_days)
        .bind(&input.description)
        .bind(updated_at)
        .execute(&mut *tx)
        .await?;

        insert_audit_entry(&mut *tx, audit).await?;
        tx.commit().await?;

        Ok(RetentionPolicy {
            policy_type,
            policy_key: policy_key.to_string(),
            retention_days: input.retention_days,
            is_active: true,
            description: input.description,
            updated_at,
        })
    }

    async fn deactivate(
        &self,
        policy_type: PolicyType,
        policy_key: &str,
        audit: NewAuditEntry,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE retention_policies
            SET is_active = 0, updated_at = ?
            WHERE policy_type = ? AND policy_key = ? AND is_active = 1
            "#,
        )
        .bind(audit.timestamp)
        .bind(policy_type.to_string())
        .bind(policy_key)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        insert_audit_entry(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }
}
