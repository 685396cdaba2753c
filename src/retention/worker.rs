//! Sweep and cleanup passes over export records.
//!
//! Each pass is independent: it reads the current records, acts on each one
//! through the [`ExportRecordManager`](crate::services::ExportRecordManager),
//! and reports aggregate counts. A failure on one record is logged and counted
//! but never aborts the pass. Cancellation is checked between records, so a
//! record's transaction is always finished before the pass stops.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::planner::{self, PlannerSettings};
use crate::{
    config::LifecycleConfig,
    models::{ExportRecord, ExportStatus},
    services::{EvictReason, LifecycleError, LifecycleResult, Services},
    storage::{StoragePressure, StorageSample, bytes_to_free},
};

/// Results from a single pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Records looked at.
    pub examined: u64,
    /// Status transitions committed (or that would be, in dry-run mode).
    pub transitioned: u64,
    /// Records evicted (or that would be, in dry-run mode).
    pub evicted: u64,
    /// Bytes released by evictions.
    pub bytes_freed: u64,
    /// Records that failed and are left for a later pass.
    pub failures: u64,
    /// The pass stopped early on shutdown.
    pub cancelled: bool,
    pub dry_run: bool,
}

impl SweepReport {
    fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    /// Check if anything was changed.
    pub fn has_changes(&self) -> bool {
        self.transitioned > 0 || self.evicted > 0
    }
}

/// Full maintenance: recompute the status of every live record, then evict
/// everything that is expired.
pub async fn run_maintenance(
    services: &Services,
    config: &LifecycleConfig,
    cancel: &CancellationToken,
) -> LifecycleResult<SweepReport> {
    let dry_run = config.retention.safety.dry_run;
    let mut report = SweepReport::new(dry_run);

    refresh_policies(services).await;

    let live = services.exports.live_records().await?;
    transition_records(services, &live, None, dry_run, cancel, &mut report).await;
    if report.cancelled {
        return Ok(report);
    }

    let limit = config
        .retention
        .safety
        .eviction_limit()
        .map(|n| i64::try_from(n).unwrap_or(i64::MAX));
    let expired = services.exports.expired_records(limit).await?;
    evict_expired(services, &expired, dry_run, cancel, &mut report).await;

    Ok(report)
}

/// Flag records that have entered the expiring window. Never evicts.
pub async fn run_expiring_check(
    services: &Services,
    config: &LifecycleConfig,
    cancel: &CancellationToken,
) -> LifecycleResult<SweepReport> {
    let dry_run = config.retention.safety.dry_run;
    let mut report = SweepReport::new(dry_run);

    let live = services.exports.live_records().await?;
    transition_records(
        services,
        &live,
        Some(ExportStatus::Expiring),
        dry_run,
        cancel,
        &mut report,
    )
    .await;

    Ok(report)
}

/// Evict up to `batch_size` expired records, oldest expiration first.
pub async fn run_expiry_batch(
    services: &Services,
    config: &LifecycleConfig,
    batch_size: u32,
    cancel: &CancellationToken,
) -> LifecycleResult<SweepReport> {
    let dry_run = config.retention.safety.dry_run;
    let mut report = SweepReport::new(dry_run);

    let expired = services
        .exports
        .expired_records(Some(i64::from(batch_size)))
        .await?;
    evict_expired(services, &expired, dry_run, cancel, &mut report).await;

    Ok(report)
}

/// Evict records chosen by the eviction planner until enough space is
/// projected to be free.
///
/// Every planned record is evicted with reason `emergency`, including ones
/// that were already expired.
pub async fn run_emergency_cleanup(
    services: &Services,
    config: &LifecycleConfig,
    pressure: StoragePressure,
    sample: &StorageSample,
    cancel: &CancellationToken,
) -> LifecycleResult<SweepReport> {
    let dry_run = config.retention.safety.dry_run;
    let dry_run_msg = if dry_run { " (DRY RUN)" } else { "" };
    let mut report = SweepReport::new(dry_run);

    let candidates = services.exports.live_records().await?;
    let target = bytes_to_free(sample, services.storage.warning_free_percent());
    let settings = PlannerSettings {
        large_threshold_bytes: services.policies.snapshot().large_threshold_bytes,
        large_min_age: config.storage.large_file_min_age(),
        max_evictions: config.retention.safety.eviction_limit(),
    };
    let now = sample.timestamp;
    let plan = planner::plan(pressure, &candidates, target, now, &settings);
    report.examined = candidates.len() as u64;

    tracing::warn!(
        pressure = %pressure,
        free_percent = ?sample.free_percent(),
        candidates = candidates.len(),
        planned = plan.len(),
        bytes_to_free = target,
        projected_bytes = plan.projected_bytes,
        "Running emergency cleanup{}",
        dry_run_msg
    );

    for entry in &plan.entries {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        if dry_run {
            tracing::info!(
                export_id = %entry.id,
                phase = entry.phase.as_str(),
                size_bytes = entry.size_bytes,
                "DRY RUN: Would evict export"
            );
            report.evicted += 1;
            report.bytes_freed += entry.size_bytes;
            continue;
        }

        match services
            .exports
            .evict(&entry.id, EvictReason::Emergency, true)
            .await
        {
            Ok(outcome) => {
                let freed = outcome.bytes_freed();
                if freed > 0 {
                    report.evicted += 1;
                    report.bytes_freed += freed;
                }
            }
            Err(e) => record_failure(&mut report, &entry.id, &e),
        }
    }

    Ok(report)
}

async fn refresh_policies(services: &Services) {
    if let Err(e) = services.policies.refresh().await {
        tracing::warn!(error = %e, "Failed to refresh retention policies, using previous snapshot");
    }
}

/// Recompute status for `records`. With `only`, just transitions into that
/// status are applied.
async fn transition_records(
    services: &Services,
    records: &[ExportRecord],
    only: Option<ExportStatus>,
    dry_run: bool,
    cancel: &CancellationToken,
    report: &mut SweepReport,
) {
    for record in records {
        if cancel.is_cancelled() {
            report.cancelled = true;
            return;
        }
        report.examined += 1;

        let derived = services.exports.derived_status(record);
        if derived == record.status || only.is_some_and(|s| s != derived) {
            continue;
        }

        if dry_run {
            tracing::info!(
                export_id = %record.id,
                old_status = %record.status,
                new_status = %derived,
                "DRY RUN: Would change export status"
            );
            report.transitioned += 1;
            continue;
        }

        match services.exports.recompute_status(&record.id).await {
            Ok(status) if status != record.status => report.transitioned += 1,
            Ok(_) => {}
            Err(e) => record_failure(report, &record.id, &e),
        }
    }
}

async fn evict_expired(
    services: &Services,
    records: &[ExportRecord],
    dry_run: bool,
    cancel: &CancellationToken,
    report: &mut SweepReport,
) {
    for record in records {
        if cancel.is_cancelled() {
            report.cancelled = true;
            return;
        }

        if dry_run {
            tracing::info!(
                export_id = %record.id,
                expires_at = %record.expires_at,
                size_bytes = record.size_bytes,
                "DRY RUN: Would evict expired export"
            );
            report.evicted += 1;
            report.bytes_freed += record.size_bytes;
            continue;
        }

        match services
            .exports
            .evict(&record.id, EvictReason::Expired, false)
            .await
        {
            Ok(outcome) => {
                let freed = outcome.bytes_freed();
                if freed > 0 {
                    report.evicted += 1;
                    report.bytes_freed += freed;
                }
            }
            // Extended between listing and eviction
            Err(LifecycleError::NotEligible { .. }) => {}
            Err(e) => record_failure(report, &record.id, &e),
        }
    }
}

fn record_failure(report: &mut SweepReport, id: &str, error: &LifecycleError) {
    report.failures += 1;
    match error {
        LifecycleError::AuditUnavailable(_) => tracing::error!(
            export_id = %id,
            error = %error,
            "Audit trail unavailable, eviction blocked"
        ),
        _ => tracing::warn!(export_id = %id, error = %error, "Failed to process export"),
    }
}
