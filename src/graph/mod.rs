//! Microsoft Graph integration.
//!
//! This module provides:
//! - A session-aware HTTP client with status mapping
//! - Managed device actions (unisolate)
//! - The audit log query API

pub mod audit_log;
pub mod client;
pub mod devices;

pub use audit_log::{AuditLogRecord, AuditQueryStatus, NewAuditLogQuery};
pub use client::GraphClient;
pub use devices::DeviceId;
