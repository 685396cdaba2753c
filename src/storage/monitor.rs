use std::{path::PathBuf, sync::Arc, time::Duration};

use super::{DiskProbe, DiskUsage, StoragePressure, StorageSample};
use crate::{clock::SharedClock, config::StorageConfig, observability::metrics};

/// Samples free space of the export directory and classifies pressure.
///
/// Sampling never fails: a probe error or timeout is logged and reported as
/// a `Normal` sample with `probe_ok = false`, so a transient stat error never
/// triggers emergency cleanup.
pub struct StorageMonitor {
    probe: Arc<dyn DiskProbe>,
    export_dir: PathBuf,
    warning_free_percent: f64,
    emergency_free_percent: f64,
    timeout: Duration,
    clock: SharedClock,
}

impl StorageMonitor {
    pub fn new(config: &StorageConfig, probe: Arc<dyn DiskProbe>, clock: SharedClock) -> Self {
        Self {
            probe,
            export_dir: config.export_dir.clone(),
            warning_free_percent: config.warning_free_percent,
            emergency_free_percent: config.emergency_free_percent,
            timeout: config.sample_timeout(),
            clock,
        }
    }

    pub fn warning_free_percent(&self) -> f64 {
        self.warning_free_percent
    }

    #[tracing::instrument(skip(self), fields(path = %self.export_dir.display()))]
    pub async fn sample(&self) -> StorageSample {
        let timestamp = self.clock.now();
        let reading = tokio::time::timeout(self.timeout, self.probe.usage(&self.export_dir)).await;

        let usage = match reading {
            Ok(Ok(usage)) => usage,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Storage sample failed, assuming normal pressure");
                return Self::placeholder(timestamp);
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "Storage sample timed out, assuming normal pressure"
                );
                return Self::placeholder(timestamp);
            }
        };

        let pressure = classify(usage, self.warning_free_percent, self.emergency_free_percent);
        metrics::record_storage_pressure(pressure.as_str(), usage.free_bytes, usage.total_bytes);

        match pressure {
            StoragePressure::Normal => tracing::debug!(
                free_bytes = usage.free_bytes,
                total_bytes = usage.total_bytes,
                "Storage pressure normal"
            ),
            StoragePressure::Warning => tracing::warn!(
                free_bytes = usage.free_bytes,
                total_bytes = usage.total_bytes,
                threshold_percent = self.warning_free_percent,
                "Storage pressure at warning level"
            ),
            StoragePressure::Emergency => tracing::error!(
                free_bytes = usage.free_bytes,
                total_bytes = usage.total_bytes,
                threshold_percent = self.emergency_free_percent,
                "Storage pressure at emergency level"
            ),
        }

        StorageSample {
            free_bytes: usage.free_bytes,
            used_bytes: usage.used_bytes(),
            total_bytes: usage.total_bytes,
            pressure,
            timestamp,
            probe_ok: true,
        }
    }

    fn placeholder(timestamp: chrono::DateTime<chrono::Utc>) -> StorageSample {
        StorageSample {
            free_bytes: 0,
            used_bytes: 0,
            total_bytes: 0,
            pressure: StoragePressure::Normal,
            timestamp,
            probe_ok: false,
        }
    }
}

/// Classify a reading against free-space thresholds given in percent.
pub fn classify(usage: DiskUsage, warning_percent: f64, emergency_percent: f64) -> StoragePressure {
    if usage.total_bytes == 0 {
        return StoragePressure::Normal;
    }
    let free_percent = usage.free_bytes as f64 * 100.0 / usage.total_bytes as f64;
    if free_percent < emergency_percent {
        StoragePressure::Emergency
    } else if free_percent < warning_percent {
        StoragePressure::Warning
    } else {
        StoragePressure::Normal
    }
}

/// Bytes that must be freed to get back above the warning threshold.
///
/// Always at least 1 so a plan under pressure is never empty by construction.
pub fn bytes_to_free(sample: &StorageSample, warning_percent: f64) -> u64 {
    let target = (sample.total_bytes as f64 * warning_percent / 100.0).ceil() as u64;
    target.saturating_sub(sample.free_bytes).max(1)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        clock::SystemClock,
        storage::{FixedProbe, StorageProbeError},
    };

    fn usage(free: u64, total: u64) -> DiskUsage {
        DiskUsage {
            free_bytes: free,
            total_bytes: total,
        }
    }

    #[rstest]
    #[case(50, StoragePressure::Normal)]
    #[case(15, StoragePressure::Normal)]
    #[case(14, StoragePressure::Warning)]
    #[case(5, StoragePressure::Warning)]
    #[case(4, StoragePressure::Emergency)]
    #[case(0, StoragePressure::Emergency)]
    fn test_classify(#[case] free: u64, #[case] expected: StoragePressure) {
        assert_eq!(classify(usage(free, 100), 15.0, 5.0), expected);
    }

    #[test]
    fn test_empty_filesystem_is_normal() {
        assert_eq!(classify(usage(0, 0), 15.0, 5.0), StoragePressure::Normal);
    }

    #[test]
    fn test_bytes_to_free() {
        let sample = StorageSample {
            free_bytes: 30,
            used_bytes: 970,
            total_bytes: 1000,
            pressure: StoragePressure::Emergency,
            timestamp: chrono::Utc::now(),
            probe_ok: true,
        };
        assert_eq!(bytes_to_free(&sample, 15.0), 120);

        let healthy = StorageSample {
            free_bytes: 500,
            ..sample
        };
        assert_eq!(bytes_to_free(&healthy, 15.0), 1);
    }

    fn monitor(probe: Arc<dyn DiskProbe>, timeout_secs: u64) -> StorageMonitor {
        let config = StorageConfig {
            sample_timeout_secs: timeout_secs,
            ..Default::default()
        };
        StorageMonitor::new(&config, probe, Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_sample_classifies_probe_reading() {
        let m = monitor(Arc::new(FixedProbe::new(3, 100)), 5);
        let sample = m.sample().await;
        assert!(sample.probe_ok);
        assert_eq!(sample.pressure, StoragePressure::Emergency);
        assert_eq!(sample.used_bytes, 97);
    }

    #[tokio::test]
    async fn test_probe_failure_reports_normal() {
        let m = monitor(Arc::new(FixedProbe::failing()), 5);
        let sample = m.sample().await;
        assert!(!sample.probe_ok);
        assert_eq!(sample.pressure, StoragePressure::Normal);
    }

    struct StuckProbe;

    #[async_trait::async_trait]
    impl DiskProbe for StuckProbe {
        async fn usage(&self, _path: &std::path::Path) -> Result<DiskUsage, StorageProbeError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stuck_probe_times_out_as_normal() {
        let m = monitor(Arc::new(StuckProbe), 1);
        let sample = m.sample().await;
        assert!(!sample.probe_ok);
        assert_eq!(sample.pressure, StoragePressure::Normal);
    }
}
