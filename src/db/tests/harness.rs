//! Test harness for database repository testing
//!
//! Provides fast in-memory SQLite databases with real migrations, plus
//! record builders shared by the repository and service tests.

use std::path::PathBuf;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::SqlitePool;

use crate::models::{ExportFormat, ExportRecord, ExportStatus};

/// Create an in-memory SQLite pool for testing
pub async fn create_sqlite_pool() -> SqlitePool {
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

/// Run SQLite migrations on the pool
///
/// Uses the actual migration files to ensure tests match production schema
pub async fn run_sqlite_migrations(pool: &SqlitePool) {
    sqlx::migrate!("./migrations_sqlx/sqlite")
        .run(pool)
        .await
        .expect("Failed to run SQLite migrations");
}

/// Fixed reference instant used across tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
}

/// Build an active record created at `created_at` with the given retention.
pub fn record_at(
    id: &str,
    format: ExportFormat,
    size_bytes: u64,
    created_at: DateTime<Utc>,
    retention_days: u32,
) -> ExportRecord {
    ExportRecord {
        id: id.to_string(),
        file_path: PathBuf::from(format!("/exports/{}.{}", id, format)),
        format,
        size_bytes,
        owner_id: "user-1".to_string(),
        owner_role: "analyst".to_string(),
        created_at,
        last_accessed_at: None,
        download_count: 0,
        retention_days,
        expires_at: created_at + Duration::days(i64::from(retention_days)),
        status: ExportStatus::Active,
    }
}
