//! Export retention configuration.
//!
//! This section is the baseline policy snapshot. Active rows in the
//! `retention_policies` table override individual values at runtime.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! default_days = 7
//! large_file_threshold_bytes = 104857600
//! large_file_max_days = 3
//! admin_role = "admin"
//! admin_bonus_days = 7
//!
//! # csv and json follow default_days when unset
//! [retention.formats]
//! excel = 14
//!
//! [retention.safety]
//! dry_run = false
//! max_evictions_per_run = 500
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::models::ExportFormat;

/// Retention rules applied when an export is registered or extended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Retention used when no format-specific value applies.
    /// Default: 7 days
    #[serde(default = "default_default_days")]
    pub default_days: u32,

    /// Base retention per export format.
    #[serde(default)]
    pub formats: FormatRetention,

    /// Artifacts strictly larger than this are capped at `large_file_max_days`.
    /// Default: 100 MiB
    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold_bytes: u64,

    /// Ceiling for large artifacts. Applied after all bonuses.
    /// Default: 3 days
    #[serde(default = "default_large_file_max_days")]
    pub large_file_max_days: u32,

    /// Role that earns `admin_bonus_days`.
    #[serde(default = "default_admin_role")]
    pub admin_role: String,

    #[serde(default = "default_admin_bonus_days")]
    pub admin_bonus_days: u32,

    /// Download count that must be exceeded to earn `popularity_bonus_days`.
    #[serde(default = "default_popularity_threshold")]
    pub popularity_threshold: u64,

    #[serde(default = "default_popularity_bonus_days")]
    pub popularity_bonus_days: u32,

    /// Records within this many hours of expiration are `expiring`.
    /// Default: 24
    #[serde(default = "default_expiring_window_hours")]
    pub expiring_window_hours: u32,

    /// Safety settings to prevent accidental data loss.
    #[serde(default)]
    pub safety: RetentionSafety,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            default_days: default_default_days(),
            formats: FormatRetention::default(),
            large_file_threshold_bytes: default_large_file_threshold(),
            large_file_max_days: default_large_file_max_days(),
            admin_role: default_admin_role(),
            admin_bonus_days: default_admin_bonus_days(),
            popularity_threshold: default_popularity_threshold(),
            popularity_bonus_days: default_popularity_bonus_days(),
            expiring_window_hours: default_expiring_window_hours(),
            safety: RetentionSafety::default(),
        }
    }
}

impl RetentionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_days == 0 {
            return Err(ConfigError::Validation(
                "retention.default_days must be at least 1".into(),
            ));
        }
        for format in ExportFormat::ALL {
            if self.formats.days_for(format) == Some(0) {
                return Err(ConfigError::Validation(format!(
                    "retention.formats.{} must be at least 1",
                    format
                )));
            }
        }
        if self.large_file_max_days == 0 {
            return Err(ConfigError::Validation(
                "retention.large_file_max_days must be at least 1".into(),
            ));
        }
        if self.large_file_threshold_bytes == 0 {
            return Err(ConfigError::Validation(
                "retention.large_file_threshold_bytes must be positive".into(),
            ));
        }
        if self.admin_role.trim().is_empty() {
            return Err(ConfigError::Validation(
                "retention.admin_role cannot be empty".into(),
            ));
        }
        if self.safety.file_delete_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "retention.safety.file_delete_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn expiring_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.expiring_window_hours))
    }
}

fn default_default_days() -> u32 {
    7
}

fn default_large_file_threshold() -> u64 {
    100 * 1024 * 1024
}

fn default_large_file_max_days() -> u32 {
    3
}

fn default_admin_role() -> String {
    "admin".to_string()
}

fn default_admin_bonus_days() -> u32 {
    7
}

fn default_popularity_threshold() -> u64 {
    5
}

fn default_popularity_bonus_days() -> u32 {
    3
}

fn default_expiring_window_hours() -> u32 {
    24
}

/// Base retention per export format, in days.
///
/// A format left unset follows `default_days`, and with it any active
/// `default/global` policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormatRetention {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv: Option<u32>,

    #[serde(default = "default_excel_days", skip_serializing_if = "Option::is_none")]
    pub excel: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<u32>,

    /// Database dumps are usually the largest artifacts.
    #[serde(
        default = "default_embedded_db_days",
        skip_serializing_if = "Option::is_none"
    )]
    pub embedded_db: Option<u32>,
}

impl Default for FormatRetention {
    fn default() -> Self {
        Self {
            csv: None,
            excel: default_excel_days(),
            json: None,
            embedded_db: default_embedded_db_days(),
        }
    }
}

impl FormatRetention {
    /// Configured days for `format`, `None` when it follows the default.
    pub fn days_for(&self, format: ExportFormat) -> Option<u32> {
        match format {
            ExportFormat::Csv => self.csv,
            ExportFormat::Excel => self.excel,
            ExportFormat::Json => self.json,
            ExportFormat::EmbeddedDb => self.embedded_db,
        }
    }
}

fn default_excel_days() -> Option<u32> {
    Some(14)
}

fn default_embedded_db_days() -> Option<u32> {
    Some(3)
}

/// Safety settings for eviction.
///
/// These settings help prevent accidental data loss and allow
/// testing retention rules before enabling them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionSafety {
    /// If true, log what would be evicted without deleting anything.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,

    /// Maximum number of evictions per scheduler run.
    /// Set to 0 for unlimited.
    /// Default: 1000
    #[serde(default = "default_max_evictions_per_run")]
    pub max_evictions_per_run: u64,

    /// Upper bound on a single file deletion.
    #[serde(default = "default_file_delete_timeout_secs")]
    pub file_delete_timeout_secs: u64,
}

impl Default for RetentionSafety {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_evictions_per_run: default_max_evictions_per_run(),
            file_delete_timeout_secs: default_file_delete_timeout_secs(),
        }
    }
}

impl RetentionSafety {
    /// Effective per-run cap, `None` when unlimited.
    pub fn eviction_limit(&self) -> Option<usize> {
        match self.max_evictions_per_run {
            0 => None,
            n => Some(usize::try_from(n).unwrap_or(usize::MAX)),
        }
    }

    pub fn file_delete_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.file_delete_timeout_secs)
    }
}

fn default_max_evictions_per_run() -> u64 {
    1000
}

fn default_file_delete_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RetentionConfig::default();
        assert_eq!(config.default_days, 7);
        assert_eq!(config.formats.days_for(ExportFormat::Csv), None);
        assert_eq!(config.formats.days_for(ExportFormat::Excel), Some(14));
        assert_eq!(config.large_file_threshold_bytes, 104_857_600);
        assert_eq!(config.large_file_max_days, 3);
        assert_eq!(config.admin_role, "admin");
        assert_eq!(config.expiring_window(), chrono::Duration::hours(24));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_formats() {
        let config: RetentionConfig = toml::from_str(
            r#"
            default_days = 10

            [formats]
            csv = 30

            [safety]
            dry_run = true
            max_evictions_per_run = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.default_days, 10);
        assert_eq!(config.formats.csv, Some(30));
        assert_eq!(config.formats.json, None);
        assert_eq!(config.formats.excel, Some(14));
        assert!(config.safety.dry_run);
        assert_eq!(config.safety.eviction_limit(), None);
    }

    #[test]
    fn test_zero_format_days_rejected() {
        let mut config = RetentionConfig::default();
        config.formats.json = Some(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retention.formats.json"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<RetentionConfig, _> = toml::from_str("default_dayz = 3");
        assert!(result.is_err());
    }
}
