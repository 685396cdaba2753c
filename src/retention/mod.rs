//! Retention rules and eviction decisions.
//!
//! - [`calculator`]: how many days an export may live
//! - [`planner`]: which exports to remove under storage pressure
//! - [`worker`]: sweep and emergency-cleanup passes driven by the scheduler

pub mod calculator;
pub mod planner;
mod worker;

pub use calculator::{PolicySnapshot, RetentionDecision, calculate};
pub use planner::{EvictionPhase, EvictionPlan, PlannedEviction, PlannerSettings, plan};
pub use worker::{
    SweepReport, run_emergency_cleanup, run_expiring_check, run_expiry_batch, run_maintenance,
};
