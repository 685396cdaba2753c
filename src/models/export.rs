use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// File format of a generated export artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Excel,
    Json,
    /// A self-contained database dump (SQLite file or similar)
    EmbeddedDb,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Csv,
        ExportFormat::Excel,
        ExportFormat::Json,
        ExportFormat::EmbeddedDb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "excel",
            ExportFormat::Json => "json",
            ExportFormat::EmbeddedDb => "embedded_db",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            "json" => Ok(ExportFormat::Json),
            "embedded_db" | "sqlite" | "db" => Ok(ExportFormat::EmbeddedDb),
            _ => Err(format!("Invalid export format: {}", s)),
        }
    }
}

/// Lifecycle status of an export record.
///
/// `Active`, `Expiring` and `Expired` are a pure function of the current time
/// and the expiration timestamp. `Deleted` is terminal and only reached through
/// an explicit eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Active,
    Expiring,
    Expired,
    Deleted,
}

impl ExportStatus {
    pub const ALL: [ExportStatus; 4] = [
        ExportStatus::Active,
        ExportStatus::Expiring,
        ExportStatus::Expired,
        ExportStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Active => "active",
            ExportStatus::Expiring => "expiring",
            ExportStatus::Expired => "expired",
            ExportStatus::Deleted => "deleted",
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, ExportStatus::Deleted)
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ExportStatus::Active),
            "expiring" => Ok(ExportStatus::Expiring),
            "expired" => Ok(ExportStatus::Expired),
            "deleted" => Ok(ExportStatus::Deleted),
            _ => Err(format!("Invalid export status: {}", s)),
        }
    }
}

/// One generated export artifact and its retention bookkeeping.
///
/// Deleted records keep their row for the audit trail; only the backing file
/// is gone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRecord {
    /// Opaque unique identifier
    pub id: String,
    /// Location of the artifact on disk (never exposed over the admin API)
    #[serde(skip_serializing)]
    pub file_path: PathBuf,
    pub format: ExportFormat,
    /// Artifact size in bytes
    pub size_bytes: u64,
    pub owner_id: String,
    /// Owner's role captured at registration; never re-fetched
    pub owner_role: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Monotonic download counter
    pub download_count: u64,
    /// Retention period in whole days, counted from `created_at`.
    ///
    /// Exact at registration. After an extension it is rounded up to whole
    /// days, so `created_at + retention_days` may run up to a day past
    /// `expires_at`. `expires_at` is authoritative.
    pub retention_days: u32,
    pub expires_at: DateTime<Utc>,
    pub status: ExportStatus,
}

impl ExportRecord {
    /// Derive the time-based status for `now`.
    ///
    /// `Deleted` is sticky. A record is `Expired` once `now` reaches the
    /// expiration timestamp and `Expiring` once less than `expiring_window`
    /// remains.
    pub fn derive_status(&self, now: DateTime<Utc>, expiring_window: Duration) -> ExportStatus {
        if self.status.is_deleted() {
            return ExportStatus::Deleted;
        }
        if now >= self.expires_at {
            ExportStatus::Expired
        } else if self.expires_at - now < expiring_window {
            ExportStatus::Expiring
        } else {
            ExportStatus::Active
        }
    }

    /// Whether the record still has a backing file.
    pub fn is_live(&self) -> bool {
        !self.status.is_deleted()
    }

    /// Time elapsed since creation.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }
}

/// Input for registering a freshly written export artifact.
#[derive(Debug, Clone)]
pub struct RegisterExport {
    pub file_path: PathBuf,
    pub format: ExportFormat,
    /// Reported size in bytes; must be positive
    pub size_bytes: i64,
    pub owner_id: String,
    pub owner_role: String,
}

/// Number of records per lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub active: u64,
    pub expiring: u64,
    pub expired: u64,
    pub deleted: u64,
}

impl StatusCounts {
    pub fn add(&mut self, status: ExportStatus, count: u64) {
        match status {
            ExportStatus::Active => self.active += count,
            ExportStatus::Expiring => self.expiring += count,
            ExportStatus::Expired => self.expired += count,
            ExportStatus::Deleted => self.deleted += count,
        }
    }

    pub fn total(&self) -> u64 {
        self.active + self.expiring + self.expired + self.deleted
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(expires_in: Duration) -> ExportRecord {
        let created_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        ExportRecord {
            id: "exp-1".to_string(),
            file_path: PathBuf::from("/tmp/exp-1.csv"),
            format: ExportFormat::Csv,
            size_bytes: 1024,
            owner_id: "user-1".to_string(),
            owner_role: "analyst".to_string(),
            created_at,
            last_accessed_at: None,
            download_count: 0,
            retention_days: 7,
            expires_at: created_at + expires_in,
            status: ExportStatus::Active,
        }
    }

    #[test]
    fn test_derive_status_boundaries() {
        let rec = record(Duration::days(7));
        let window = Duration::hours(24);

        assert_eq!(
            rec.derive_status(rec.created_at, window),
            ExportStatus::Active
        );
        assert_eq!(
            rec.derive_status(rec.expires_at - Duration::hours(24), window),
            ExportStatus::Active
        );
        assert_eq!(
            rec.derive_status(rec.expires_at - Duration::hours(23), window),
            ExportStatus::Expiring
        );
        assert_eq!(
            rec.derive_status(rec.expires_at - Duration::seconds(1), window),
            ExportStatus::Expiring
        );
        assert_eq!(rec.derive_status(rec.expires_at, window), ExportStatus::Expired);
        assert_eq!(
            rec.derive_status(rec.expires_at + Duration::days(30), window),
            ExportStatus::Expired
        );
    }

    #[test]
    fn test_deleted_is_sticky() {
        let mut rec = record(Duration::days(7));
        rec.status = ExportStatus::Deleted;
        assert_eq!(
            rec.derive_status(rec.created_at, Duration::hours(24)),
            ExportStatus::Deleted
        );
        assert!(!rec.is_live());
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("xlsx".parse::<ExportFormat>().unwrap(), ExportFormat::Excel);
        assert_eq!(
            "sqlite".parse::<ExportFormat>().unwrap(),
            ExportFormat::EmbeddedDb
        );
        assert!("parquet".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in ExportStatus::ALL {
            assert_eq!(status.as_str().parse::<ExportStatus>().unwrap(), status);
        }
    }
}
