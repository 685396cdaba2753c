mod audit_entries;
mod common;
mod exports;
mod retention_policies;

pub use audit_entries::SqliteAuditEntryRepo;
pub use exports::SqliteExportRepo;
pub use retention_policies::SqliteRetentionPolicyRepo;
