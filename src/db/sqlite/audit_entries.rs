use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::common::{from_db_int, insert_audit_entry, parse_column, parse_uuid};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::AuditEntryRepo,
    },
    models::{AuditEntry, AuditEntryQuery, ExportStatus, NewAuditEntry},
};

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 10_000;

pub struct SqliteAuditEntryRepo {
    pool: SqlitePool,
}

/// Bound parameter for a dynamically built filter.
enum Param {
    Text(String),
    Int(i64),
    Time(DateTime<Utc>),
}

impl SqliteAuditEntryRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_row(row: &SqliteRow) -> DbResult<AuditEntry> {
        let old_status: Option<String> = row.get("old_status");
        let new_status: Option<String> = row.get("new_status");
        let retention_days: Option<i64> = row.get("retention_days");
        let file_size: Option<i64> = row.get("file_size");

        Ok(AuditEntry {
            seq: row.get("seq"),
            id: parse_uuid(&row.get::<String, _>("id"))?,
            export_id: row.get("export_id"),
            action: parse_column(&row.get::<String, _>("action"))?,
            old_status: old_status
                .map(|s| parse_column::<ExportStatus>(&s))
                .transpose()?,
            new_status: new_status
                .map(|s| parse_column::<ExportStatus>(&s))
                .transpose()?,
            retention_days: retention_days
                .map(|d| {
                    u32::try_from(d).map_err(|_| {
                        DbError::Internal(format!("Invalid retention_days in database: {}", d))
                    })
                })
                .transpose()?,
            file_size: file_size
                .map(|s| from_db_int(s, "file_size"))
                .transpose()?,
            reason: row.get("reason"),
            timestamp: row.get("timestamp"),
        })
    }
}

#[async_trait]
impl AuditEntryRepo for SqliteAuditEntryRepo {
    async fn append(&self, entry: NewAuditEntry) -> DbResult<AuditEntry> {
        let mut conn = self.pool.acquire().await?;
        insert_audit_entry(&mut *conn, entry).await
    }

    async fn list(&self, query: AuditEntryQuery) -> DbResult<Vec<AuditEntry>> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);

        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if let Some(export_id) = query.export_id {
            conditions.push("export_id = ?");
            params.push(Param::Text(export_id));
        }
        if let Some(action) = query.action {
            conditions.push("action = ?");
            params.push(Param::Text(action.to_string()));
        }
        if let Some(from) = query.from {
            conditions.push("timestamp >= ?");
            params.push(Param::Time(from));
        }
        if let Some(to) = query.to {
            conditions.push("timestamp < ?");
            params.push(Param::Time(to));
        }
        if let Some(after_seq) = query.after_seq {
            conditions.push("seq > ?");
            params.push(Param::Int(after_seq));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            r#"
            SELECT seq, id, export_id, action, old_status, new_status,
                   retention_days, file_size, reason, timestamp
            FROM audit_entries
            {}
            ORDER BY seq ASC
            LIMIT ?
            "#,
            where_clause
        );

        let mut db_query = sqlx::query(&sql);
        for param in params {
            db_query = match param {
                Param::Text(s) => db_query.bind(s),
                Param::Int(i) => db_query.bind(i),
                Param::Time(t) => db_query.bind(t),
            };
        }
        let rows = db_query.bind(limit).fetch_all(&self.pool).await?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn list_for_export(&self, export_id: &str) -> DbResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT seq, id, export_id, action, old_status, new_status,
                   retention_days, file_size, reason, timestamp
            FROM audit_entries
            WHERE export_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(export_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1 FROM audit_entries LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(())
    }
}
