use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attribute a retention policy is keyed on.
///
/// The meaning of `retention_days` depends on the type:
///
/// | type          | key                       | days mean            |
/// |---------------|---------------------------|----------------------|
/// | `default`     | `global`                  | fallback period      |
/// | `format`      | `csv`, `excel`, ...       | base period          |
/// | `size_class`  | `large`                   | ceiling for large files |
/// | `role`        | role name (e.g. `admin`)  | bonus added          |
/// | `popularity`  | `popular`                 | bonus added          |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    Default,
    Format,
    SizeClass,
    Role,
    Popularity,
}

impl std::fmt::Display for PolicyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyType::Default => write!(f, "default"),
            PolicyType::Format => write!(f, "format"),
            PolicyType::SizeClass => write!(f, "size_class"),
            PolicyType::Role => write!(f, "role"),
            PolicyType::Popularity => write!(f, "popularity"),
        }
    }
}

impl std::str::FromStr for PolicyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PolicyType::Default),
            "format" => Ok(PolicyType::Format),
            "size_class" => Ok(PolicyType::SizeClass),
            "role" => Ok(PolicyType::Role),
            "popularity" => Ok(PolicyType::Popularity),
            _ => Err(format!("Invalid policy type: {}", s)),
        }
    }
}

/// Well-known policy keys.
pub mod policy_keys {
    pub const GLOBAL: &str = "global";
    pub const LARGE: &str = "large";
    pub const POPULAR: &str = "popular";
}

/// Admin-configured retention rule, keyed by (policy_type, policy_key).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionPolicy {
    pub policy_type: PolicyType,
    pub policy_key: String,
    /// Stored signed so malformed rows can be detected and skipped
    pub retention_days: i64,
    pub is_active: bool,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating or replacing a retention policy
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertRetentionPolicy {
    pub retention_days: i64,
    #[serde(default)]
    pub description: Option<String>,
}
