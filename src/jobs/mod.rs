//! Background jobs for export maintenance.
//!
//! - **Maintenance**: daily full sweep. Recomputes every live record's status
//!   and evicts expired records.
//! - **Frequent check**: flags records entering the expiring window and
//!   evicts a small batch of expired records.
//! - **Storage watch**: samples free space and triggers emergency cleanup
//!   when it drops below the emergency threshold.
//!
//! Jobs follow a consistent pattern:
//! 1. Cadence configuration in `config/scheduler.rs`
//! 2. Timer loop that sleeps until the next run or shutdown
//! 3. Single-pass run function in `retention::worker`
//! 4. [`SweepReport`](crate::retention::SweepReport) describing the pass
//! 5. Metrics for run outcome, duration and skipped runs
//!
//! # Example
//!
//! ```toml
//! [scheduler]
//! maintenance_hour_utc = 3
//! frequent_check_interval_secs = 3600
//!
//! [scheduler.storage_watch]
//! business_hours_interval_secs = 300
//! off_hours_interval_secs = 1800
//! ```

mod scheduler;

pub use scheduler::{
    JobKind, JobOutcome, JobRunInfo, LifecycleStatus, Scheduler, SchedulerError, WatchOutcome,
    next_daily_run, storage_watch_interval,
};
