//! Eviction planning under storage pressure.
//!
//! Candidates are taken in three phases until the projected freed bytes
//! reach the target or the candidates run out:
//!
//! 1. Expired records, oldest expiration first.
//! 2. Large records not yet expired and older than the minimum age, largest first.
//! 3. Remaining live records, oldest creation first.
//!
//! Under `Warning` pressure only phase 1 runs; under `Normal` nothing is planned.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::{models::ExportRecord, storage::StoragePressure};

/// Which phase selected a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPhase {
    Expired,
    LargeFile,
    Oldest,
}

impl EvictionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPhase::Expired => "expired",
            EvictionPhase::LargeFile => "large_file",
            EvictionPhase::Oldest => "oldest",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannerSettings {
    /// Records strictly larger than this qualify for phase 2
    pub large_threshold_bytes: u64,
    /// Phase 2 only takes records at least this old
    pub large_min_age: Duration,
    /// Upper bound on planned evictions (None = unlimited)
    pub max_evictions: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedEviction {
    pub id: String,
    pub phase: EvictionPhase,
    pub size_bytes: u64,
}

/// Ordered list of records to evict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvictionPlan {
    pub entries: Vec<PlannedEviction>,
    /// Sum of the sizes of all planned records
    pub projected_bytes: u64,
}

impl EvictionPlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }
}

/// Build an eviction plan from `candidates`.
///
/// Deleted records are ignored. A record appears at most once, in the first
/// phase that selects it.
pub fn plan(
    pressure: StoragePressure,
    candidates: &[ExportRecord],
    bytes_to_free: u64,
    now: DateTime<Utc>,
    settings: &PlannerSettings,
) -> EvictionPlan {
    let mut builder = PlanBuilder {
        plan: EvictionPlan::default(),
        taken: HashSet::new(),
        bytes_to_free,
        max: settings.max_evictions,
    };

    if pressure == StoragePressure::Normal {
        return builder.plan;
    }

    let live: Vec<&ExportRecord> = candidates.iter().filter(|r| r.is_live()).collect();

    let mut expired: Vec<&ExportRecord> = live
        .iter()
        .copied()
        .filter(|r| r.expires_at <= now)
        .collect();
    expired.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then_with(|| a.id.cmp(&b.id)));
    if !builder.take_all(expired, EvictionPhase::Expired) {
        return builder.plan;
    }

    if pressure != StoragePressure::Emergency {
        return builder.plan;
    }

    let mut large: Vec<&ExportRecord> = live
        .iter()
        .copied()
        .filter(|r| {
            r.expires_at > now
                && r.size_bytes > settings.large_threshold_bytes
                && r.age(now) >= settings.large_min_age
        })
        .collect();
    large.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes).then_with(|| a.id.cmp(&b.id)));
    if !builder.take_all(large, EvictionPhase::LargeFile) {
        return builder.plan;
    }

    let mut oldest = live;
    oldest.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    builder.take_all(oldest, EvictionPhase::Oldest);

    builder.plan
}

struct PlanBuilder {
    plan: EvictionPlan,
    taken: HashSet<String>,
    bytes_to_free: u64,
    max: Option<usize>,
}

impl PlanBuilder {
    fn done(&self) -> bool {
        self.plan.projected_bytes >= self.bytes_to_free
            || self.max.is_some_and(|max| self.plan.entries.len() >= max)
    }

    /// Take records in order until done. Returns false once done.
    fn take_all(&mut self, records: Vec<&ExportRecord>, phase: EvictionPhase) -> bool {
        for record in records {
            if self.done() {
                return false;
            }
            if !self.taken.insert(record.id.clone()) {
                continue;
            }
            self.plan.projected_bytes = self.plan.projected_bytes.saturating_add(record.size_bytes);
            self.plan.entries.push(PlannedEviction {
                id: record.id.clone(),
                phase,
                size_bytes: record.size_bytes,
            });
        }
        !self.done()
    }
}
