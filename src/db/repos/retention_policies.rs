use async_trait::async_trait;

use crate::{
    db::error::DbResult,
    models::{NewAuditEntry, PolicyType, RetentionPolicy, UpsertRetentionPolicy},
};

#[async_trait]
pub trait RetentionPolicyRepo: Send + Sync {
    /// List policies ordered by type and key.
    async fn list(&self, active_only: bool) -> DbResult<Vec<RetentionPolicy>>;

    async fn get(
        &self,
        policy_type: PolicyType,
        policy_key: &str,
    ) -> DbResult<Option<RetentionPolicy>>;

    /// Create or replace a policy and (re)activate it, recording `audit`
    /// in the same transaction.
    async fn upsert(
        &self,
        policy_type: PolicyType,
        policy_key: &str,
        input: UpsertRetentionPolicy,
        audit: NewAuditEntry,
    ) -> DbResult<RetentionPolicy>;

    /// Deactivate a policy, recording `audit` in the same transaction.
    ///
    /// Returns `NotFound` if there is no active policy with that key.
    async fn deactivate(
        &self,
        policy_type: PolicyType,
        policy_key: &str,
        audit: NewAuditEntry,
    ) -> DbResult<()>;
}
