mod audit_entries;
mod exports;
mod retention_policies;

pub use audit_entries::*;
pub use exports::*;
pub use retention_policies::*;
