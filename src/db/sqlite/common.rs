use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::{
    db::error::{DbError, DbResult},
    models::{AuditEntry, NewAuditEntry},
};

/// Parse a UUID string from the database, returning a DbError on failure
pub fn parse_uuid(s: &str) -> DbResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DbError::Internal(format!("Invalid UUID in database: {}", e)))
}

/// Parse an enum column through its `FromStr` impl.
pub fn parse_column<T>(s: &str) -> DbResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    s.parse().map_err(DbError::Internal)
}

/// SQLite integers are signed; reject values that do not fit.
pub fn to_db_int(value: u64, column: &str) -> DbResult<i64> {
    i64::try_from(value)
        .map_err(|_| DbError::Validation(format!("{} out of range: {}", column, value)))
}

pub fn from_db_int(value: i64, column: &str) -> DbResult<u64> {
    u64::try_from(value)
        .map_err(|_| DbError::Internal(format!("Negative {} in database: {}", column, value)))
}

/// Insert an audit entry on an open connection, usually inside the
/// transaction of the mutation it describes.
pub async fn insert_audit_entry(
    conn: &mut SqliteConnection,
    entry: NewAuditEntry,
) -> DbResult<AuditEntry> {
    let id = Uuid::new_v4();
    let file_size = entry
        .file_size
        .map(|s| to_db_int(s, "file_size"))
        .transpose()?;

    let result = sqlx::query(
        r#"
        INSERT INTO audit_entries (
            id, export_id, action, old_status, new_status,
            retention_days, file_size, reason, timestamp
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&entry.export_id)
    .bind(entry.action.to_string())
    .bind(entry.old_status.map(|s| s.as_str()))
    .bind(entry.new_status.map(|s| s.as_str()))
    .bind(entry.retention_days.map(i64::from))
    .bind(file_size)
    .bind(&entry.reason)
    .bind(entry.timestamp)
    .execute(&mut *conn)
    .await
    .map_err(DbError::AuditWrite)?;

    Ok(AuditEntry {
        seq: result.last_insert_rowid(),
        id,
        export_id: entry.export_id,
        action: entry.action,
        old_status: entry.old_status,
        new_status: entry.new_status,
        retention_days: entry.retention_days,
        file_size: entry.file_size,
        reason: entry.reason,
        timestamp: entry.timestamp,
    })
}
