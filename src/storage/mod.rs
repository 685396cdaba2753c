//! Free-space sampling for the export directory.

mod monitor;
mod probe;

pub use monitor::{StorageMonitor, bytes_to_free, classify};
#[cfg(test)]
pub use probe::FixedProbe;
pub use probe::{DiskProbe, DiskUsage, StatvfsProbe, StorageProbeError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Classification of remaining free space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoragePressure {
    Normal,
    Warning,
    Emergency,
}

impl StoragePressure {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoragePressure::Normal => "normal",
            StoragePressure::Warning => "warning",
            StoragePressure::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for StoragePressure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One point-in-time reading of the export filesystem. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageSample {
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub pressure: StoragePressure,
    pub timestamp: DateTime<Utc>,
    /// False when the probe failed and the sample is a `Normal` placeholder
    pub probe_ok: bool,
}

impl StorageSample {
    /// Free space as a percentage of the total, or None for an empty filesystem.
    pub fn free_percent(&self) -> Option<f64> {
        (self.total_bytes > 0).then(|| self.free_bytes as f64 * 100.0 / self.total_bytes as f64)
    }
}
