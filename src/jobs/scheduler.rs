//! Timer-driven control loop for export maintenance.
//!
//! Three independent timers:
//!
//! - **Maintenance** (daily, fixed UTC hour): recompute every live record's
//!   status and evict everything expired.
//! - **Frequent check** (short interval): flag records entering the expiring
//!   window and evict a small batch of expired records.
//! - **Storage watch** (shorter interval during business hours): sample free
//!   space and run emergency cleanup right away under emergency pressure.
//!
//! A timer that fires while its previous run is still active is skipped.

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc, Weekday};
use parking_lot::RwLock;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    clock::SharedClock,
    config::{LifecycleConfig, StorageWatchConfig},
    models::StatusCounts,
    observability::metrics,
    retention::{self, SweepReport},
    services::{LifecycleError, LifecycleResult, Services},
    storage::{StoragePressure, StorageSample},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Maintenance,
    FrequentCheck,
    StorageWatch,
    EmergencyCleanup,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::Maintenance,
        JobKind::FrequentCheck,
        JobKind::StorageWatch,
        JobKind::EmergencyCleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Maintenance => "maintenance",
            JobKind::FrequentCheck => "frequent_check",
            JobKind::StorageWatch => "storage_watch",
            JobKind::EmergencyCleanup => "emergency_cleanup",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{0} is already running")]
    Busy(JobKind),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Success,
    Error,
}

/// Last completed run of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRunInfo {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: JobOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SweepReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one storage watch tick.
#[derive(Debug, Clone, Serialize)]
pub struct WatchOutcome {
    pub sample: StorageSample,
    /// Present when emergency cleanup ran
    pub cleanup: Option<SweepReport>,
}

/// Operational snapshot for status endpoints and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleStatus {
    pub storage: StorageSample,
    pub counts: StatusCounts,
    pub jobs: BTreeMap<JobKind, JobRunInfo>,
    /// Jobs with a run in progress
    pub running: Vec<JobKind>,
    pub scheduler_enabled: bool,
    pub dry_run: bool,
}

#[derive(Default)]
struct JobGuards {
    maintenance: Mutex<()>,
    frequent_check: Mutex<()>,
    storage_watch: Mutex<()>,
    emergency_cleanup: Mutex<()>,
}

pub struct Scheduler {
    services: Services,
    config: Arc<LifecycleConfig>,
    clock: SharedClock,
    guards: JobGuards,
    last_runs: RwLock<BTreeMap<JobKind, JobRunInfo>>,
}

impl Scheduler {
    pub fn new(services: Services, config: Arc<LifecycleConfig>, clock: SharedClock) -> Self {
        Self {
            services,
            config,
            clock,
            guards: JobGuards::default(),
            last_runs: RwLock::new(BTreeMap::new()),
        }
    }

    fn guard(&self, kind: JobKind) -> &Mutex<()> {
        match kind {
            JobKind::Maintenance => &self.guards.maintenance,
            JobKind::FrequentCheck => &self.guards.frequent_check,
            JobKind::StorageWatch => &self.guards.storage_watch,
            JobKind::EmergencyCleanup => &self.guards.emergency_cleanup,
        }
    }

    /// Run `job` unless a previous run of the same kind is still active, and
    /// record its outcome.
    async fn run_guarded<T, Fut>(
        &self,
        kind: JobKind,
        report_of: fn(&T) -> Option<SweepReport>,
        job: Fut,
    ) -> Result<T, SchedulerError>
    where
        Fut: std::future::Future<Output = LifecycleResult<T>>,
    {
        let Ok(_running) = self.guard(kind).try_lock() else {
            metrics::record_scheduler_skip(kind.as_str());
            tracing::info!(job = kind.as_str(), "Previous run still in progress, skipping");
            return Err(SchedulerError::Busy(kind));
        };

        let started_at = self.clock.now();
        let start = Instant::now();
        let result = job.await;
        let duration = start.elapsed();

        let info = match &result {
            Ok(value) => {
                let report = report_of(value);
                match &report {
                    Some(r) if r.has_changes() || r.failures > 0 => tracing::info!(
                        job = kind.as_str(),
                        examined = r.examined,
                        transitioned = r.transitioned,
                        evicted = r.evicted,
                        bytes_freed = r.bytes_freed,
                        failures = r.failures,
                        cancelled = r.cancelled,
                        dry_run = r.dry_run,
                        duration_ms = duration.as_millis() as u64,
                        "Job run complete{}",
                        if r.dry_run { " (DRY RUN)" } else { "" }
                    ),
                    _ => tracing::debug!(job = kind.as_str(), "Job run complete, nothing to do"),
                }
                JobRunInfo {
                    started_at,
                    finished_at: self.clock.now(),
                    outcome: JobOutcome::Success,
                    report,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(job = kind.as_str(), error = %e, "Job run failed");
                JobRunInfo {
                    started_at,
                    finished_at: self.clock.now(),
                    outcome: JobOutcome::Error,
                    report: None,
                    error: Some(e.to_string()),
                }
            }
        };

        let outcome = match info.outcome {
            JobOutcome::Success => "success",
            JobOutcome::Error => "error",
        };
        metrics::record_scheduler_run(kind.as_str(), outcome, duration.as_secs_f64());
        self.last_runs.write().insert(kind, info);

        result.map_err(SchedulerError::from)
    }

    /// Full maintenance sweep.
    pub async fn run_maintenance(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SweepReport, SchedulerError> {
        self.run_guarded(
            JobKind::Maintenance,
            |r: &SweepReport| Some(r.clone()),
            retention::run_maintenance(&self.services, &self.config, cancel),
        )
        .await
    }

    /// Expiring-window check plus a small batch of expired evictions.
    pub async fn run_frequent_check(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SweepReport, SchedulerError> {
        let job = async {
            let mut report =
                retention::run_expiring_check(&self.services, &self.config, cancel).await?;
            let batch = retention::run_expiry_batch(
                &self.services,
                &self.config,
                self.config.scheduler.frequent_cleanup_batch_size,
                cancel,
            )
            .await?;
            report.evicted += batch.evicted;
            report.bytes_freed += batch.bytes_freed;
            report.failures += batch.failures;
            report.cancelled |= batch.cancelled;
            Ok::<_, LifecycleError>(report)
        };
        self.run_guarded(JobKind::FrequentCheck, |r: &SweepReport| Some(r.clone()), job)
            .await
    }

    /// Sample storage; run emergency cleanup under emergency pressure.
    pub async fn run_storage_watch(
        &self,
        cancel: &CancellationToken,
    ) -> Result<WatchOutcome, SchedulerError> {
        let job = async {
            let sample = self.services.storage.sample().await;
            let cleanup = if sample.pressure == StoragePressure::Emergency {
                match self.cleanup(StoragePressure::Emergency, &sample, cancel).await {
                    Ok(report) => Some(report),
                    Err(SchedulerError::Busy(_)) => None,
                    Err(SchedulerError::Lifecycle(e)) => return Err(e),
                }
            } else {
                None
            };
            Ok::<_, LifecycleError>(WatchOutcome { sample, cleanup })
        };
        self.run_guarded(JobKind::StorageWatch, |w: &WatchOutcome| w.cleanup.clone(), job)
            .await
    }

    /// Forced emergency cleanup, regardless of the current pressure.
    pub async fn run_emergency_cleanup(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SweepReport, SchedulerError> {
        let sample = self.services.storage.sample().await;
        self.cleanup(StoragePressure::Emergency, &sample, cancel)
            .await
    }

    async fn cleanup(
        &self,
        pressure: StoragePressure,
        sample: &StorageSample,
        cancel: &CancellationToken,
    ) -> Result<SweepReport, SchedulerError> {
        self.run_guarded(
            JobKind::EmergencyCleanup,
            |r: &SweepReport| Some(r.clone()),
            retention::run_emergency_cleanup(&self.services, &self.config, pressure, sample, cancel),
        )
        .await
    }

    /// Last completed run per job.
    pub fn last_runs(&self) -> BTreeMap<JobKind, JobRunInfo> {
        self.last_runs.read().clone()
    }

    /// Jobs currently holding their run guard.
    pub fn running(&self) -> Vec<JobKind> {
        JobKind::ALL
            .into_iter()
            .filter(|kind| self.guard(*kind).try_lock().is_err())
            .collect()
    }

    pub async fn status(&self) -> LifecycleResult<LifecycleStatus> {
        let storage = self.services.storage.sample().await;
        let counts = self.services.exports.counts().await?;
        Ok(LifecycleStatus {
            storage,
            counts,
            jobs: self.last_runs(),
            running: self.running(),
            scheduler_enabled: self.config.scheduler.enabled,
            dry_run: self.config.retention.safety.dry_run,
        })
    }

    /// Spawn the three timer loops onto `tracker`. They stop when `cancel`
    /// fires; a run in progress finishes its current record first.
    pub fn spawn(self: &Arc<Self>, tracker: &TaskTracker, cancel: &CancellationToken) {
        let config = &self.config.scheduler;
        if !config.enabled {
            tracing::info!("Scheduler disabled by configuration");
            return;
        }

        let dry_run = self.config.retention.safety.dry_run;
        tracing::info!(
            maintenance_hour_utc = config.maintenance_hour_utc,
            frequent_check_interval_secs = config.frequent_check_interval_secs,
            business_hours_interval_secs = config.storage_watch.business_hours_interval_secs,
            off_hours_interval_secs = config.storage_watch.off_hours_interval_secs,
            dry_run,
            "Starting export lifecycle scheduler{}",
            if dry_run { " (DRY RUN)" } else { "" }
        );

        tracker.spawn(Arc::clone(self).maintenance_loop(cancel.clone()));
        tracker.spawn(Arc::clone(self).frequent_check_loop(cancel.clone()));
        tracker.spawn(Arc::clone(self).storage_watch_loop(cancel.clone()));
    }

    async fn maintenance_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let now = self.clock.now();
            let next = next_daily_run(now, self.config.scheduler.maintenance_hour_utc);
            tracing::debug!(next_run = %next, "Next maintenance run scheduled");
            let wait = (next - now).to_std().unwrap_or_default();
            if !sleep_or_cancel(wait, &cancel).await {
                break;
            }
            let _ = self.run_maintenance(&cancel).await;
        }
        tracing::debug!("Maintenance loop stopped");
    }

    async fn frequent_check_loop(self: Arc<Self>, cancel: CancellationToken) {
        let interval = self.config.scheduler.frequent_check_interval();
        loop {
            if !sleep_or_cancel(interval, &cancel).await {
                break;
            }
            let _ = self.run_frequent_check(&cancel).await;
        }
        tracing::debug!("Frequent check loop stopped");
    }

    async fn storage_watch_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let _ = self.run_storage_watch(&cancel).await;

            let wait = storage_watch_interval(self.clock.now(), &self.config.scheduler.storage_watch);
            if !sleep_or_cancel(wait, &cancel).await {
                break;
            }
        }
        tracing::debug!("Storage watch loop stopped");
    }
}

/// Sleep for `duration`. Returns false if cancelled first.
async fn sleep_or_cancel(duration: std::time::Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Next occurrence of `hour:00` UTC strictly after `now`.
pub fn next_daily_run(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(time).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Storage watch interval in effect at `now` (UTC).
pub fn storage_watch_interval(
    now: DateTime<Utc>,
    config: &StorageWatchConfig,
) -> std::time::Duration {
    let hour = now.hour();
    let weekday = !matches!(now.weekday(), Weekday::Sat | Weekday::Sun);
    let business = hour >= config.business_hours_start
        && hour < config.business_hours_end
        && (weekday || !config.weekdays_only);

    std::time::Duration::from_secs(if business {
        config.business_hours_interval_secs
    } else {
        config.off_hours_interval_secs
    })
}

#[cfg(all(test, feature = "database-sqlite"))]
mod tests {
    use std::path::PathBuf;

    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        clock::manual::ManualClock,
        db::{
            DbPool,
            tests::harness::{create_sqlite_pool, run_sqlite_migrations, t0},
        },
        models::{AuditAction, ExportFormat, ExportStatus, RegisterExport},
        services::FilesystemArtifactStore,
        storage::FixedProbe,
    };

    const MB: i64 = 1024 * 1024;

    struct Fixture {
        scheduler: Scheduler,
        services: Services,
        db: Arc<DbPool>,
        clock: Arc<ManualClock>,
        probe: Arc<FixedProbe>,
        dir: TempDir,
    }

    async fn fixture_with(config: LifecycleConfig) -> Fixture {
        let pool = create_sqlite_pool().await;
        run_sqlite_migrations(&pool).await;
        let db = Arc::new(DbPool::from_sqlite(pool));
        let clock = Arc::new(ManualClock::new(t0()));
        let probe = Arc::new(FixedProbe::new(80, 100));
        let services = Services::new(
            Arc::clone(&db),
            &config,
            Arc::new(FilesystemArtifactStore::new(std::time::Duration::from_secs(5))),
            probe.clone(),
            clock.clone(),
        );
        let scheduler = Scheduler::new(services.clone(), Arc::new(config), clock.clone());
        Fixture {
            scheduler,
            services,
            db,
            clock,
            probe,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(LifecycleConfig::default()).await
    }

    impl Fixture {
        async fn register(&self, name: &str, size_bytes: i64) -> (String, PathBuf) {
            let path = self.dir.path().join(name);
            tokio::fs::write(&path, b"rows").await.unwrap();
            let record = self
                .services
                .exports
                .register(RegisterExport {
                    file_path: path.clone(),
                    format: ExportFormat::Csv,
                    size_bytes,
                    owner_id: "user-1".to_string(),
                    owner_role: "analyst".to_string(),
                })
                .await
                .unwrap();
            (record.id, path)
        }

        async fn actions(&self, id: &str) -> Vec<AuditAction> {
            self.db
                .audit_entries()
                .list_for_export(id)
                .await
                .unwrap()
                .iter()
                .map(|e| e.action)
                .collect()
        }
    }

    #[tokio::test]
    async fn test_maintenance_expires_and_evicts() {
        let f = fixture().await;
        let (old, old_path) = f.register("old.csv", MB).await;
        f.clock.advance(Duration::days(3));
        let (fresh, fresh_path) = f.register("fresh.csv", MB).await;
        f.clock.advance(Duration::days(5));

        let report = f
            .scheduler
            .run_maintenance(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.evicted, 1);
        assert_eq!(report.bytes_freed, MB as u64);
        assert_eq!(report.failures, 0);
        assert!(!old_path.exists());
        assert!(fresh_path.exists());
        assert_eq!(
            f.actions(&old).await,
            vec![
                AuditAction::Created,
                AuditAction::Expired,
                AuditAction::Evicted
            ]
        );
        // 2 days left on the fresh record: still active
        assert_eq!(f.actions(&fresh).await, vec![AuditAction::Created]);

        let last = &f.scheduler.last_runs()[&JobKind::Maintenance];
        assert_eq!(last.outcome, JobOutcome::Success);
        assert_eq!(last.finished_at, t0() + Duration::days(8));
    }

    #[tokio::test]
    async fn test_dry_run_changes_nothing() {
        let mut config = LifecycleConfig::default();
        config.retention.safety.dry_run = true;
        let f = fixture_with(config).await;
        let (id, path) = f.register("a.csv", MB).await;
        f.clock.advance(Duration::days(10));

        let report = f
            .scheduler
            .run_maintenance(&CancellationToken::new())
            .await
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.evicted, 1);
        assert_eq!(report.transitioned, 1);
        assert!(path.exists());
        assert_eq!(f.actions(&id).await, vec![AuditAction::Created]);
    }

    #[tokio::test]
    async fn test_frequent_check_flags_expiring_without_evicting() {
        let f = fixture().await;
        let (id, path) = f.register("a.csv", MB).await;
        f.clock.advance(Duration::days(6) + Duration::hours(12));

        let report = f
            .scheduler
            .run_frequent_check(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.transitioned, 1);
        assert_eq!(report.evicted, 0);
        assert!(path.exists());
        assert_eq!(
            f.services.exports.get(&id).await.unwrap().status,
            ExportStatus::Expiring
        );
    }

    #[tokio::test]
    async fn test_frequent_check_evicts_small_batch() {
        let mut config = LifecycleConfig::default();
        config.scheduler.frequent_cleanup_batch_size = 2;
        let f = fixture_with(config).await;
        for i in 0..3 {
            f.register(&format!("{}.csv", i), MB).await;
        }
        f.clock.advance(Duration::days(8));

        let report = f
            .scheduler
            .run_frequent_check(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.evicted, 2);
        assert_eq!(f.services.exports.counts().await.unwrap().deleted, 2);
    }

    #[tokio::test]
    async fn test_emergency_pressure_evicts_immediately() {
        let f = fixture().await;
        let (first, first_path) = f.register("first.csv", MB).await;
        f.clock.advance(Duration::hours(1));
        let (_second, second_path) = f.register("second.csv", MB).await;

        f.probe.set(2, 100);
        let outcome = f
            .scheduler
            .run_storage_watch(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.sample.pressure, StoragePressure::Emergency);
        let cleanup = outcome.cleanup.expect("emergency cleanup should run");
        assert!(cleanup.evicted >= 1);
        assert!(!first_path.exists());
        assert!(second_path.exists());

        let entries = f.db.audit_entries().list_for_export(&first).await.unwrap();
        let evicted = entries
            .iter()
            .find(|e| e.action == AuditAction::Evicted)
            .expect("evicted entry");
        assert_eq!(evicted.reason.as_deref(), Some("emergency"));
        assert!(f.scheduler.last_runs().contains_key(&JobKind::EmergencyCleanup));
    }

    #[tokio::test]
    async fn test_normal_pressure_does_not_clean_up() {
        let f = fixture().await;
        f.register("a.csv", MB).await;

        let outcome = f
            .scheduler
            .run_storage_watch(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.sample.pressure, StoragePressure::Normal);
        assert!(outcome.cleanup.is_none());
        assert_eq!(f.services.exports.counts().await.unwrap().deleted, 0);
    }

    #[tokio::test]
    async fn test_probe_failure_never_triggers_cleanup() {
        let f = fixture().await;
        f.register("a.csv", MB).await;
        let failing = Services::new(
            Arc::clone(&f.db),
            &LifecycleConfig::default(),
            Arc::new(FilesystemArtifactStore::new(std::time::Duration::from_secs(5))),
            Arc::new(FixedProbe::failing()),
            f.clock.clone(),
        );
        let scheduler = Scheduler::new(
            failing,
            Arc::new(LifecycleConfig::default()),
            f.clock.clone(),
        );

        let outcome = scheduler
            .run_storage_watch(&CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.sample.probe_ok);
        assert!(outcome.cleanup.is_none());
    }

    #[tokio::test]
    async fn test_overlapping_run_is_skipped() {
        let f = fixture().await;
        let _held = f.scheduler.guard(JobKind::Maintenance).lock().await;

        let err = f
            .scheduler
            .run_maintenance(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Busy(JobKind::Maintenance)));
        assert!(f.scheduler.last_runs().is_empty());
        assert_eq!(f.scheduler.running(), vec![JobKind::Maintenance]);
    }

    #[tokio::test]
    async fn test_cancelled_sweep_stops_before_next_record() {
        let f = fixture().await;
        let (_, path) = f.register("a.csv", MB).await;
        f.clock.advance(Duration::days(8));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = f.scheduler.run_maintenance(&cancel).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.evicted, 0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_status_reports_counts_and_runs() {
        let f = fixture().await;
        f.register("a.csv", MB).await;
        f.scheduler
            .run_frequent_check(&CancellationToken::new())
            .await
            .unwrap();

        let status = f.scheduler.status().await.unwrap();
        assert_eq!(status.counts.active, 1);
        assert_eq!(status.storage.pressure, StoragePressure::Normal);
        assert!(status.jobs.contains_key(&JobKind::FrequentCheck));
        assert!(status.scheduler_enabled);
    }

    #[test]
    fn test_next_daily_run() {
        let at = |h, m| Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap();
        assert_eq!(next_daily_run(at(1, 30), 3), at(3, 0));
        assert_eq!(next_daily_run(at(3, 0), 3), at(3, 0) + Duration::days(1));
        assert_eq!(next_daily_run(at(22, 0), 3), at(3, 0) + Duration::days(1));
    }

    #[test]
    fn test_storage_watch_interval_follows_business_hours() {
        let config = StorageWatchConfig::default();
        let business = std::time::Duration::from_secs(config.business_hours_interval_secs);
        let off = std::time::Duration::from_secs(config.off_hours_interval_secs);

        // 2026-03-02 is a Monday, 2026-03-07 a Saturday
        let monday = |h| Utc.with_ymd_and_hms(2026, 3, 2, h, 0, 0).unwrap();
        let saturday = Utc.with_ymd_and_hms(2026, 3, 7, 10, 0, 0).unwrap();

        assert_eq!(storage_watch_interval(monday(10), &config), business);
        assert_eq!(storage_watch_interval(monday(8), &config), off);
        assert_eq!(storage_watch_interval(monday(18), &config), off);
        assert_eq!(storage_watch_interval(saturday, &config), off);

        let every_day = StorageWatchConfig {
            weekdays_only: false,
            ..config
        };
        assert_eq!(storage_watch_interval(saturday, &every_day), business);
    }
}
