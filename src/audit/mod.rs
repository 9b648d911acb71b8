//! Data lifecycle audit export.
//!
//! Searches the audit log for deletion and retention-label events over a bounded
//! window and writes the results to a CSV file for compliance review.

pub mod export;
pub mod job;
pub mod models;

pub use job::run_audit_export;
pub use models::{AuditJobOptions, EventKind};
