//! Shared database repository test infrastructure
//!
//! Each repository has a test module containing shared test functions that
//! take `&dyn XxxRepo`, plus SQLite-specific setup using in-memory databases
//! with the real migrations.
//!
//! ```bash
//! cargo test db::tests
//! ```

mod audit_entries;
mod exports;
pub mod harness;
