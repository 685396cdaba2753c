//! Scheduler cadence configuration.
//!
//! ```toml
//! [scheduler]
//! maintenance_hour_utc = 3
//! frequent_check_interval_secs = 3600
//!
//! [scheduler.storage_watch]
//! business_hours_interval_secs = 300
//! off_hours_interval_secs = 1800
//! business_hours_start = 9
//! business_hours_end = 18
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Whether to run the background scheduler in `serve`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Hour of day (UTC) at which the full maintenance sweep runs.
    #[serde(default = "default_maintenance_hour")]
    pub maintenance_hour_utc: u32,

    /// Interval of the lightweight expiry check.
    #[serde(default = "default_frequent_check_interval")]
    pub frequent_check_interval_secs: u64,

    /// Maximum expired records evicted by one frequent check.
    #[serde(default = "default_frequent_cleanup_batch_size")]
    pub frequent_cleanup_batch_size: u32,

    #[serde(default)]
    pub storage_watch: StorageWatchConfig,

    /// How long shutdown waits for in-flight jobs.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            maintenance_hour_utc: default_maintenance_hour(),
            frequent_check_interval_secs: default_frequent_check_interval(),
            frequent_cleanup_batch_size: default_frequent_cleanup_batch_size(),
            storage_watch: StorageWatchConfig::default(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maintenance_hour_utc > 23 {
            return Err(ConfigError::Validation(format!(
                "scheduler.maintenance_hour_utc must be 0-23, got {}",
                self.maintenance_hour_utc
            )));
        }
        if self.frequent_check_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "scheduler.frequent_check_interval_secs must be positive".into(),
            ));
        }
        if self.frequent_cleanup_batch_size == 0 {
            return Err(ConfigError::Validation(
                "scheduler.frequent_cleanup_batch_size must be positive".into(),
            ));
        }
        self.storage_watch.validate()
    }

    pub fn frequent_check_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.frequent_check_interval_secs)
    }

    pub fn shutdown_grace(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Storage watch cadence. Polls faster while people are working.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageWatchConfig {
    #[serde(default = "default_business_hours_interval")]
    pub business_hours_interval_secs: u64,

    #[serde(default = "default_off_hours_interval")]
    pub off_hours_interval_secs: u64,

    /// First business hour (UTC, inclusive).
    #[serde(default = "default_business_hours_start")]
    pub business_hours_start: u32,

    /// End of business hours (UTC, exclusive).
    #[serde(default = "default_business_hours_end")]
    pub business_hours_end: u32,

    /// Treat Saturday and Sunday as off-hours.
    #[serde(default = "default_true")]
    pub weekdays_only: bool,
}

impl Default for StorageWatchConfig {
    fn default() -> Self {
        Self {
            business_hours_interval_secs: default_business_hours_interval(),
            off_hours_interval_secs: default_off_hours_interval(),
            business_hours_start: default_business_hours_start(),
            business_hours_end: default_business_hours_end(),
            weekdays_only: true,
        }
    }
}

impl StorageWatchConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.business_hours_interval_secs == 0 || self.off_hours_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "scheduler.storage_watch intervals must be positive".into(),
            ));
        }
        if self.business_hours_start >= self.business_hours_end || self.business_hours_end > 24 {
            return Err(ConfigError::Validation(format!(
                "scheduler.storage_watch business hours {}..{} are not a valid window",
                self.business_hours_start, self.business_hours_end
            )));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_maintenance_hour() -> u32 {
    3
}

fn default_frequent_check_interval() -> u64 {
    3600
}

fn default_frequent_cleanup_batch_size() -> u32 {
    50
}

fn default_business_hours_interval() -> u64 {
    300
}

fn default_off_hours_interval() -> u64 {
    1800
}

fn default_business_hours_start() -> u32 {
    9
}

fn default_business_hours_end() -> u32 {
    18
}

fn default_shutdown_grace_secs() -> u64 {
    30
}
