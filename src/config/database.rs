use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Database configuration.
///
/// The database holds the export records, retention policies and the
/// append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum DatabaseConfig {
    /// No database. Only useful for config validation and `--help`.
    None,

    /// SQLite database. The default for single-node deployments.
    #[cfg(feature = "database-sqlite")]
    Sqlite(SqliteConfig),
}

impl Default for DatabaseConfig {
    #[cfg(feature = "database-sqlite")]
    fn default() -> Self {
        DatabaseConfig::Sqlite(SqliteConfig::default())
    }

    #[cfg(not(feature = "database-sqlite"))]
    fn default() -> Self {
        DatabaseConfig::None
    }
}

impl DatabaseConfig {
    pub fn is_none(&self) -> bool {
        matches!(self, DatabaseConfig::None)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            DatabaseConfig::None => Ok(()),
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(c) => c.validate(),
        }
    }

    /// Whether migrations should run on startup.
    pub fn run_migrations(&self) -> bool {
        match self {
            DatabaseConfig::None => false,
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(c) => c.run_migrations,
        }
    }
}

/// SQLite configuration.
#[cfg(feature = "database-sqlite")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    /// Use `:memory:` for an in-memory database (testing only).
    #[serde(default = "default_sqlite_path")]
    pub path: String,

    /// Create the database file if it doesn't exist.
    #[serde(default = "default_true")]
    pub create_if_missing: bool,

    /// Run migrations on startup.
    #[serde(default = "default_true")]
    pub run_migrations: bool,

    /// Enable WAL mode for better concurrency.
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_sqlite_max_connections")]
    pub max_connections: u32,
}

#[cfg(feature = "database-sqlite")]
impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_sqlite_path(),
            create_if_missing: true,
            run_migrations: true,
            wal_mode: true,
            busy_timeout_ms: default_busy_timeout(),
            max_connections: default_sqlite_max_connections(),
        }
    }
}

#[cfg(feature = "database-sqlite")]
impl SqliteConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.path.is_empty() {
            return Err(ConfigError::Validation(
                "SQLite path cannot be empty".into(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Validation(
                "SQLite max_connections must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(feature = "database-sqlite")]
fn default_sqlite_path() -> String {
    "data/export-lifecycle.db".to_string()
}

#[cfg(feature = "database-sqlite")]
fn default_busy_timeout() -> u64 {
    5000 // 5 seconds
}

#[cfg(feature = "database-sqlite")]
fn default_sqlite_max_connections() -> u32 {
    5
}

#[cfg(feature = "database-sqlite")]
fn default_true() -> bool {
    true
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sqlite() {
        let config: DatabaseConfig = toml::from_str(
            r#"
            type = "sqlite"
            path = "/var/lib/exports/lifecycle.db"
            wal_mode = false
            "#,
        )
        .unwrap();

        match config {
            DatabaseConfig::Sqlite(c) => {
                assert_eq!(c.path, "/var/lib/exports/lifecycle.db");
                assert!(!c.wal_mode);
                assert!(c.run_migrations);
                assert_eq!(c.busy_timeout_ms, 5000);
            }
            DatabaseConfig::None => panic!("expected sqlite config"),
        }
    }

    #[test]
    fn test_empty_path_rejected() {
        let config = DatabaseConfig::Sqlite(SqliteConfig {
            path: String::new(),
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }
}
