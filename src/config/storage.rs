use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Export storage configuration.
///
/// ```toml
/// [storage]
/// export_dir = "/var/lib/exports"
/// warning_free_percent = 15.0
/// emergency_free_percent = 5.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding export artifacts. Free space is sampled on the
    /// filesystem that contains it.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    /// Below this share of free space the pressure is `warning`.
    #[serde(default = "default_warning_free_percent")]
    pub warning_free_percent: f64,

    /// Below this share of free space the pressure is `emergency`.
    #[serde(default = "default_emergency_free_percent")]
    pub emergency_free_percent: f64,

    /// Upper bound on a single free-space sample.
    #[serde(default = "default_sample_timeout_secs")]
    pub sample_timeout_secs: u64,

    /// Minimum age before a large, unexpired export becomes an
    /// eviction candidate under emergency pressure.
    #[serde(default = "default_large_file_min_age_hours")]
    pub large_file_min_age_hours: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            export_dir: default_export_dir(),
            warning_free_percent: default_warning_free_percent(),
            emergency_free_percent: default_emergency_free_percent(),
            sample_timeout_secs: default_sample_timeout_secs(),
            large_file_min_age_hours: default_large_file_min_age_hours(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        if !in_range(self.warning_free_percent) || !in_range(self.emergency_free_percent) {
            return Err(ConfigError::Validation(
                "storage free-space thresholds must be between 0 and 100".into(),
            ));
        }
        if self.emergency_free_percent >= self.warning_free_percent {
            return Err(ConfigError::Validation(format!(
                "storage.emergency_free_percent ({}) must be below storage.warning_free_percent ({})",
                self.emergency_free_percent, self.warning_free_percent
            )));
        }
        if self.sample_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "storage.sample_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn sample_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sample_timeout_secs)
    }

    pub fn large_file_min_age(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.large_file_min_age_hours))
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("data/exports")
}

fn default_warning_free_percent() -> f64 {
    15.0
}

fn default_emergency_free_percent() -> f64 {
    5.0
}

fn default_sample_timeout_secs() -> u64 {
    5
}

fn default_large_file_min_age_hours() -> u32 {
    24
}
