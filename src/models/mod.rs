mod audit_entry;
mod export;
mod retention_policy;

pub use audit_entry::*;
pub use export::*;
pub use retention_policy::*;
