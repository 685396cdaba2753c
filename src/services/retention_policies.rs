use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::{
    clock::SharedClock,
    config::RetentionConfig,
    db::{DbError, DbPool, DbResult},
    models::{
        ExportFormat, NewAuditEntry, PolicyType, RetentionPolicy, UpsertRetentionPolicy,
    },
    observability::metrics,
    retention::PolicySnapshot,
};

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Invalid retention policy: {0}")]
    Invalid(String),

    #[error("Retention policy not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] DbError),
}

fn store_error(err: DbError) -> PolicyError {
    if err.is_audit_failure() {
        metrics::record_audit_failure();
        tracing::error!(error = %err, "Audit trail unavailable, policy change rolled back");
    }
    PolicyError::Store(err)
}

/// Holds the retention rules in effect.
///
/// The `[retention]` config section is the baseline; active rows of the
/// policy table are overlaid on it. Readers get an immutable
/// [`PolicySnapshot`] that stays valid while a refresh swaps in a new one.
pub struct PolicyStore {
    db: Arc<DbPool>,
    baseline: PolicySnapshot,
    current: RwLock<Arc<PolicySnapshot>>,
    clock: SharedClock,
}

impl PolicyStore {
    pub fn new(db: Arc<DbPool>, config: &RetentionConfig, clock: SharedClock) -> Self {
        let baseline = PolicySnapshot::from_config(config);
        Self {
            db,
            current: RwLock::new(Arc::new(baseline.clone())),
            baseline,
            clock,
        }
    }

    /// The snapshot currently in effect.
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Rebuild the snapshot from config and the active policy rows.
    ///
    /// On a store error the previous snapshot stays in effect.
    pub async fn refresh(&self) -> DbResult<Arc<PolicySnapshot>> {
        let policies = self.db.retention_policies().list(true).await?;
        let mut snapshot = self.baseline.clone();
        let applied = snapshot.apply_policies(&policies);
        tracing::debug!(
            active = policies.len(),
            applied,
            "Refreshed retention policy snapshot"
        );

        let snapshot = Arc::new(snapshot);
        *self.current.write() = Arc::clone(&snapshot);
        Ok(snapshot)
    }

    pub async fn list(&self, active_only: bool) -> DbResult<Vec<RetentionPolicy>> {
        self.db.retention_policies().list(active_only).await
    }

    /// Create or replace a policy and make it take effect immediately.
    ///
    /// Only new registrations and extensions see the change; existing
    /// records keep their retention period.
    #[tracing::instrument(skip(self, input), fields(retention_days = input.retention_days))]
    pub async fn set_policy(
        &self,
        policy_type: PolicyType,
        policy_key: &str,
        input: UpsertRetentionPolicy,
    ) -> Result<RetentionPolicy, PolicyError> {
        let key = canonical_key(policy_type, policy_key)?;
        let now = self.clock.now();

        let candidate = RetentionPolicy {
            policy_type,
            policy_key: key.clone(),
            retention_days: input.retention_days,
            is_active: true,
            description: input.description.clone(),
            updated_at: now,
        };
        let days = {
            let mut probe = self.baseline.clone();
            probe.apply_policy(&candidate).map_err(PolicyError::Invalid)?;
            u32::try_from(input.retention_days).ok()
        };

        let audit = NewAuditEntry::policy_changed(
            format!("{}/{} = {} days", policy_type, key, input.retention_days),
            days,
            now,
        );
        let policy = self
            .db
            .retention_policies()
            .upsert(policy_type, &key, input, audit)
            .await
            .map_err(store_error)?;
        metrics::record_lifecycle_transition("policy_changed");

        tracing::info!(
            policy_type = %policy_type,
            policy_key = %key,
            retention_days = policy.retention_days,
            "Retention policy updated"
        );
        self.refresh_after_change().await;
        Ok(policy)
    }

    /// Deactivate a policy. The baseline value applies again.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate_policy(
        &self,
        policy_type: PolicyType,
        policy_key: &str,
    ) -> Result<(), PolicyError> {
        let key = canonical_key(policy_type, policy_key)?;
        let audit = NewAuditEntry::policy_changed(
            format!("{}/{} deactivated", policy_type, key),
            None,
            self.clock.now(),
        );
        match self
            .db
            .retention_policies()
            .deactivate(policy_type, &key, audit)
            .await
        {
            Ok(()) => {}
            Err(DbError::NotFound) => return Err(PolicyError::NotFound),
            Err(e) => return Err(store_error(e)),
        }
        metrics::record_lifecycle_transition("policy_changed");

        tracing::info!(policy_type = %policy_type, policy_key = %key, "Retention policy deactivated");
        self.refresh_after_change().await;
        Ok(())
    }

    async fn refresh_after_change(&self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "Failed to refresh policy snapshot after change");
        }
    }
}

/// Normalize the key so aliases (`xlsx`, `sqlite`) map to one row.
fn canonical_key(policy_type: PolicyType, key: &str) -> Result<String, PolicyError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(PolicyError::Invalid("policy key must not be empty".into()));
    }
    match policy_type {
        PolicyType::Format => key
            .parse::<ExportFormat>()
            .map(|f| f.as_str().to_string())
            .map_err(PolicyError::Invalid),
        _ => Ok(key.to_string()),
    }
}
