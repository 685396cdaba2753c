//! Retention period calculation.
//!
//! [`calculate`] is a pure function of an immutable [`PolicySnapshot`] and the
//! export's attributes. The snapshot is built from the `[retention]` config
//! section and overlaid with active rows of the `retention_policies` table.

use std::collections::HashMap;

use serde::Serialize;

use crate::{
    config::RetentionConfig,
    models::{ExportFormat, PolicyType, RetentionPolicy, policy_keys},
};

/// Longest retention a single policy row may set (ten years).
pub const MAX_POLICY_DAYS: i64 = 3650;

/// Immutable set of retention rules in effect at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySnapshot {
    /// Fallback when no format-specific value exists
    pub default_days: u32,
    /// Only formats with an explicit value; the rest use `default_days`
    pub format_days: HashMap<ExportFormat, u32>,
    /// Artifacts strictly larger than this are capped
    pub large_threshold_bytes: u64,
    pub large_cap_days: u32,
    /// Bonus days per owner role
    pub role_bonus_days: HashMap<String, u32>,
    /// Download count that must be exceeded for the popularity bonus
    pub popularity_threshold: u64,
    pub popularity_bonus_days: u32,
}

impl PolicySnapshot {
    /// Baseline snapshot from configuration only.
    pub fn from_config(config: &RetentionConfig) -> Self {
        let format_days = ExportFormat::ALL
            .iter()
            .filter_map(|f| config.formats.days_for(*f).map(|days| (*f, days)))
            .collect();

        let mut role_bonus_days = HashMap::new();
        role_bonus_days.insert(config.admin_role.clone(), config.admin_bonus_days);

        Self {
            default_days: config.default_days,
            format_days,
            large_threshold_bytes: config.large_file_threshold_bytes,
            large_cap_days: config.large_file_max_days,
            role_bonus_days,
            popularity_threshold: config.popularity_threshold,
            popularity_bonus_days: config.popularity_bonus_days,
        }
    }

    /// Overlay active policy rows on top of this snapshot.
    ///
    /// Rows that cannot be applied are skipped with a warning and the
    /// baseline value stays in effect. Returns the number of rows applied.
    pub fn apply_policies(&mut self, policies: &[RetentionPolicy]) -> usize {
        let mut applied = 0;
        for policy in policies.iter().filter(|p| p.is_active) {
            match self.apply_policy(policy) {
                Ok(()) => applied += 1,
                Err(reason) => {
                    tracing::warn!(
                        policy_type = %policy.policy_type,
                        policy_key = %policy.policy_key,
                        retention_days = policy.retention_days,
                        reason = %reason,
                        "Skipping malformed retention policy"
                    );
                }
            }
        }
        applied
    }

    /// Apply one policy row, or explain why it cannot be applied.
    pub fn apply_policy(&mut self, policy: &RetentionPolicy) -> Result<(), String> {
        let days = validate_days(policy.policy_type, policy.retention_days)?;
        let key = policy.policy_key.as_str();

        match policy.policy_type {
            PolicyType::Default if key == policy_keys::GLOBAL => self.default_days = days,
            PolicyType::Format => {
                let format: ExportFormat = key.parse()?;
                self.format_days.insert(format, days);
            }
            PolicyType::SizeClass if key == policy_keys::LARGE => self.large_cap_days = days,
            PolicyType::Role if !key.trim().is_empty() => {
                self.role_bonus_days.insert(key.to_string(), days);
            }
            PolicyType::Popularity if key == policy_keys::POPULAR => {
                self.popularity_bonus_days = days
            }
            _ => return Err(format!("unsupported key '{}'", key)),
        }
        Ok(())
    }
}

/// Check that `days` is usable for a policy of this type.
///
/// Bonus policies may be zero (no bonus); periods and caps must be positive.
pub fn validate_days(policy_type: PolicyType, days: i64) -> Result<u32, String> {
    let min = match policy_type {
        PolicyType::Role | PolicyType::Popularity => 0,
        PolicyType::Default | PolicyType::Format | PolicyType::SizeClass => 1,
    };
    if days < min || days > MAX_POLICY_DAYS {
        return Err(format!(
            "retention_days must be between {} and {}, got {}",
            min, MAX_POLICY_DAYS, days
        ));
    }
    u32::try_from(days).map_err(|_| format!("retention_days out of range: {}", days))
}

/// Outcome of a retention calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionDecision {
    /// Retention period in whole days, always at least 1
    pub days: u32,
    /// No format-specific value existed and the global default was used
    pub used_default: bool,
    /// The large-file cap lowered the result
    pub capped: bool,
}

/// Compute the retention period for an export.
///
/// 1. Base period for `format`, else the global default.
/// 2. Plus the role bonus if `owner_role` has one.
/// 3. Plus the popularity bonus if `download_count` exceeds the threshold.
/// 4. If `size_bytes` exceeds the large-file threshold, take the minimum of
///    the result and the large-file cap. The cap is applied after the bonuses.
pub fn calculate(
    snapshot: &PolicySnapshot,
    format: ExportFormat,
    size_bytes: u64,
    owner_role: &str,
    download_count: u64,
) -> RetentionDecision {
    let (mut days, used_default) = match snapshot.format_days.get(&format) {
        Some(d) => (*d, false),
        None => (snapshot.default_days, true),
    };

    if let Some(bonus) = snapshot.role_bonus_days.get(owner_role) {
        days = days.saturating_add(*bonus);
    }

    if download_count > snapshot.popularity_threshold {
        days = days.saturating_add(snapshot.popularity_bonus_days);
    }

    let mut capped = false;
    if size_bytes > snapshot.large_threshold_bytes && days > snapshot.large_cap_days {
        days = snapshot.large_cap_days;
        capped = true;
    }

    RetentionDecision {
        days: days.max(1),
        used_default,
        capped,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rstest::rstest;

    use super::*;

    const MB: u64 = 1024 * 1024;

    fn snapshot() -> PolicySnapshot {
        PolicySnapshot::from_config(&RetentionConfig::default())
    }

    fn policy(policy_type: PolicyType, key: &str, days: i64) -> RetentionPolicy {
        RetentionPolicy {
            policy_type,
            policy_key: key.to_string(),
            retention_days: days,
            is_active: true,
            description: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_csv_non_admin_no_bonus() {
        let decision = calculate(&snapshot(), ExportFormat::Csv, 50 * MB, "analyst", 0);
        assert_eq!(decision.days, 7);
        assert!(decision.used_default);
        assert!(!decision.capped);
    }

    #[test]
    fn test_large_excel_admin_is_capped() {
        let decision = calculate(&snapshot(), ExportFormat::Excel, 150 * MB, "admin", 0);
        assert_eq!(decision.days, 3);
        assert!(decision.capped);
    }

    #[test]
    fn test_admin_bonus() {
        let decision = calculate(&snapshot(), ExportFormat::Csv, MB, "admin", 0);
        assert_eq!(decision.days, 14);
    }

    #[rstest]
    #[case(0, 7)]
    #[case(5, 7)]
    #[case(6, 10)]
    #[case(1000, 10)]
    fn test_popularity_threshold_is_exclusive(#[case] downloads: u64, #[case] expected: u32) {
        let decision = calculate(&snapshot(), ExportFormat::Json, MB, "analyst", downloads);
        assert_eq!(decision.days, expected);
    }

    #[test]
    fn test_size_threshold_is_exclusive() {
        let s = snapshot();
        let at = calculate(&s, ExportFormat::Excel, s.large_threshold_bytes, "analyst", 0);
        assert_eq!(at.days, 14);
        let above = calculate(&s, ExportFormat::Excel, s.large_threshold_bytes + 1, "analyst", 0);
        assert_eq!(above.days, 3);
    }

    #[test]
    fn test_cap_does_not_raise_short_retention() {
        let decision = calculate(&snapshot(), ExportFormat::EmbeddedDb, 500 * MB, "analyst", 0);
        assert_eq!(decision.days, 3);
        assert!(!decision.capped);

        let mut s = snapshot();
        s.format_days.insert(ExportFormat::EmbeddedDb, 1);
        let decision = calculate(&s, ExportFormat::EmbeddedDb, 500 * MB, "analyst", 0);
        assert_eq!(decision.days, 1);
    }

    #[test]
    fn test_unconfigured_format_falls_back_to_default() {
        let mut config = RetentionConfig::default();
        config.default_days = 5;
        let s = PolicySnapshot::from_config(&config);
        assert!(!s.format_days.contains_key(&ExportFormat::Json));

        let decision = calculate(&s, ExportFormat::Json, MB, "analyst", 0);
        assert_eq!(decision.days, 5);
        assert!(decision.used_default);

        let decision = calculate(&s, ExportFormat::Excel, MB, "analyst", 0);
        assert_eq!(decision.days, 14);
        assert!(!decision.used_default);
    }

    #[test]
    fn test_global_policy_governs_unconfigured_formats() {
        let mut s = snapshot();
        s.apply_policies(&[policy(PolicyType::Default, "global", 30)]);
        assert_eq!(calculate(&s, ExportFormat::Csv, MB, "analyst", 0).days, 30);
        assert_eq!(calculate(&s, ExportFormat::Json, MB, "analyst", 0).days, 30);
        assert_eq!(calculate(&s, ExportFormat::Excel, MB, "analyst", 0).days, 14);
    }

    #[test]
    fn test_result_is_always_positive_and_capped() {
        let mut s = snapshot();
        s.role_bonus_days.insert("owner".to_string(), 0);
        s.large_cap_days = 2;
        for format in ExportFormat::ALL {
            for size in [1, MB, 100 * MB, 100 * MB + 1, 10_000 * MB] {
                for role in ["analyst", "admin", "owner"] {
                    for downloads in [0, 5, 6, u64::MAX] {
                        let d = calculate(&s, format, size, role, downloads);
                        assert!(d.days >= 1);
                        if size > s.large_threshold_bytes {
                            assert!(d.days <= s.large_cap_days);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_apply_policies_overrides_baseline() {
        let mut s = snapshot();
        let applied = s.apply_policies(&[
            policy(PolicyType::Format, "csv", 30),
            policy(PolicyType::Default, "global", 9),
            policy(PolicyType::SizeClass, "large", 2),
            policy(PolicyType::Role, "auditor", 4),
            policy(PolicyType::Popularity, "popular", 1),
        ]);
        assert_eq!(applied, 5);
        assert_eq!(s.format_days[&ExportFormat::Csv], 30);
        assert_eq!(s.default_days, 9);
        assert_eq!(s.large_cap_days, 2);
        assert_eq!(s.role_bonus_days["auditor"], 4);
        assert_eq!(s.role_bonus_days["admin"], 7);
        assert_eq!(s.popularity_bonus_days, 1);
    }

    #[test]
    fn test_malformed_policies_are_skipped() {
        let mut s = snapshot();
        let mut inactive = policy(PolicyType::Format, "json", 99);
        inactive.is_active = false;
        let applied = s.apply_policies(&[
            policy(PolicyType::Format, "csv", 0),
            policy(PolicyType::Format, "parquet", 10),
            policy(PolicyType::Default, "regional", 10),
            policy(PolicyType::SizeClass, "large", -3),
            policy(PolicyType::Format, "excel", MAX_POLICY_DAYS + 1),
            inactive,
        ]);
        assert_eq!(applied, 0);
        assert_eq!(s, snapshot());
    }

    #[test]
    fn test_validate_days_bounds() {
        assert!(validate_days(PolicyType::Role, 0).is_ok());
        assert!(validate_days(PolicyType::Format, 0).is_err());
        assert_eq!(validate_days(PolicyType::Format, 14), Ok(14));
        assert!(validate_days(PolicyType::Popularity, -1).is_err());
    }
}
