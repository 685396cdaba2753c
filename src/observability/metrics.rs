//! Prometheus metrics for the export lifecycle.
//!
//! Provides metrics for:
//! - Lifecycle transitions recorded in the audit trail
//! - Evictions, freed bytes and eviction failures
//! - Storage pressure and free space
//! - Scheduler runs and skipped (coalesced) runs
//!
//! Without the `prometheus` feature every recording function is a no-op.

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;

#[cfg(feature = "prometheus")]
use metrics::{counter, gauge, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Global Prometheus handle for the metrics endpoint.
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics system with the given configuration.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            &config.duration_buckets_secs,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?;

    let handle = builder.install_recorder().map_err(MetricsError::Install)?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("Metrics already initialized".to_string()))?;

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record an audited lifecycle action (e.g. "created", "expired", "evicted").
pub fn record_lifecycle_transition(action: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "export_lifecycle_transitions_total",
            "action" => action.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = action;
    }
}

/// Record a completed eviction.
///
/// # Arguments
/// * `reason` - "expired" or "emergency"
/// * `bytes` - Size of the removed artifact
pub fn record_eviction(reason: &str, bytes: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "export_evictions_total",
            "reason" => reason.to_string()
        )
        .increment(1);
        counter!(
            "export_evicted_bytes_total",
            "reason" => reason.to_string()
        )
        .increment(bytes);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (reason, bytes);
    }
}

/// Record an eviction that failed and will be retried by a later sweep.
pub fn record_eviction_failure(reason: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "export_eviction_failures_total",
            "reason" => reason.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = reason;
    }
}

/// Record a storage sample.
///
/// The pressure level is exported as a gauge (0 = normal, 1 = warning,
/// 2 = emergency) alongside free and total bytes.
pub fn record_storage_pressure(level: &str, free_bytes: u64, total_bytes: u64) {
    #[cfg(feature = "prometheus")]
    {
        let value = match level {
            "emergency" => 2.0,
            "warning" => 1.0,
            _ => 0.0,
        };
        gauge!("export_storage_pressure_level").set(value);
        gauge!("export_storage_free_bytes").set(free_bytes as f64);
        gauge!("export_storage_total_bytes").set(total_bytes as f64);
        counter!(
            "export_storage_samples_total",
            "pressure" => level.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (level, free_bytes, total_bytes);
    }
}

/// Record a scheduler job run.
///
/// # Arguments
/// * `job` - "maintenance", "frequent_check", "storage_watch" or "emergency_cleanup"
/// * `outcome` - "success" or "error"
/// * `duration_secs` - Wall time of the run
pub fn record_scheduler_run(job: &str, outcome: &str, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "export_scheduler_runs_total",
            "job" => job.to_string(),
            "outcome" => outcome.to_string()
        )
        .increment(1);
        histogram!(
            "export_scheduler_run_duration_seconds",
            "job" => job.to_string()
        )
        .record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (job, outcome, duration_secs);
    }
}

/// Record a scheduler tick skipped because the previous run was still active.
pub fn record_scheduler_skip(job: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "export_scheduler_skips_total",
            "job" => job.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = job;
    }
}

/// Record a failed audit write or audit pre-flight.
pub fn record_audit_failure() {
    #[cfg(feature = "prometheus")]
    {
        counter!("export_audit_failures_total").increment(1);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
