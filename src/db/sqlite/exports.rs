use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::common::{from_db_int, insert_audit_entry, parse_column, to_db_int};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::ExportRepo,
    },
    models::{ExportRecord, ExportStatus, NewAuditEntry, StatusCounts},
};

const EXPORT_COLUMNS: &str = "id, file_path, format, size_bytes, owner_id, owner_role, \
     created_at, last_accessed_at, download_count, retention_days, expires_at, status";

pub struct SqliteExportRepo {
    pool: SqlitePool,
}

impl SqliteExportRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &SqliteRow) -> DbResult<ExportRecord> {
        let retention_days: i64 = row.get("retention_days");
        Ok(ExportRecord {
            id: row.get("id"),
            file_path: PathBuf::from(row.get::<String, _>("file_path")),
            format: parse_column(&row.get::<String, _>("format"))?,
            size_bytes: from_db_int(row.get("size_bytes"), "size_bytes")?,
            owner_id: row.get("owner_id"),
            owner_role: row.get("owner_role"),
            created_at: row.get("created_at"),
            last_accessed_at: row.get("last_accessed_at"),
            download_count: from_db_int(row.get("download_count"), "download_count")?,
            retention_days: u32::try_from(retention_days).map_err(|_| {
                DbError::Internal(format!("Invalid retention_days in database: {}", retention_days))
            })?,
            expires_at: row.get("expires_at"),
            status: parse_column(&row.get::<String, _>("status"))?,
        })
    }
}

#[async_trait]
impl ExportRepo for SqliteExportRepo {
    async fn insert(&self, record: &ExportRecord, audit: NewAuditEntry) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO export_records (
                id, file_path, format, size_bytes, owner_id, owner_role,
                created_at, last_accessed_at, download_count, retention_days,
                expires_at, status
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.file_path.to_string_lossy().as_ref())
        .bind(record.format.as_str())
        .bind(to_db_int(record.size_bytes, "size_bytes")?)
        .bind(&record.owner_id)
        .bind(&record.owner_role)
        .bind(record.created_at)
        .bind(record.last_accessed_at)
        .bind(to_db_int(record.download_count, "download_count")?)
        .bind(i64::from(record.retention_days))
        .bind(record.expires_at)
        .bind(record.status.as_str())
        .execute(&mut *tx)
        .await;

        if let Err(e) = result {
            if let sqlx::Error::Database(db_err) = &e
                && db_err.is_unique_violation()
            {
                return Err(DbError::Conflict(format!(
                    "Export with id '{}' already exists",
                    record.id
                )));
            }
            return Err(e.into());
        }

        insert_audit_entry(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> DbResult<Option<ExportRecord>> {
        let query = format!("SELECT {} FROM export_records WHERE id = ?", EXPORT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn update(&self, record: &ExportRecord, audit: NewAuditEntry) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE export_records
            SET last_accessed_at = ?,
                download_count = ?,
                retention_days = ?,
                expires_at = ?,
                status = ?
            WHERE id = ?
            "#,
        )
        .bind(record.last_accessed_at)
        .bind(to_db_int(record.download_count, "download_count")?)
        .bind(i64::from(record.retention_days))
        .bind(record.expires_at)
        .bind(record.status.as_str())
        .bind(&record.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        insert_audit_entry(&mut *tx, audit).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_live(&self) -> DbResult<Vec<ExportRecord>> {
        let query = format!(
            "SELECT {} FROM export_records WHERE status != 'deleted' ORDER BY expires_at ASC, id ASC",
            EXPORT_COLUMNS
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: Option<i64>,
    ) -> DbResult<Vec<ExportRecord>> {
        let query = format!(
            "SELECT {} FROM export_records \
             WHERE status != 'deleted' AND expires_at <= ? \
             ORDER BY expires_at ASC, id ASC LIMIT ?",
            EXPORT_COLUMNS
        );
        // SQLite treats a negative LIMIT as unbounded
        let rows = sqlx::query(&query)
            .bind(now)
            .bind(limit.unwrap_or(-1))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn count_by_status(&self) -> DbResult<StatusCounts> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM export_records GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let status: ExportStatus = parse_column(&row.get::<String, _>("status"))?;
            counts.add(status, from_db_int(row.get("count"), "count")?);
        }
        Ok(counts)
    }
}
