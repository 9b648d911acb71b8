//! Audit export data models.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AuditExportConfig;
use crate::error::AppError;

/// Lifecycle operation to search for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// A file was deleted.
    FileDeleted,
    /// A retention label was applied to an item.
    TagApplied,
    /// A retention label was removed from an item.
    TagRemoved,
    /// Any other audit operation name, passed through as-is.
    Other(String),
}

impl EventKind {
    /// Operation name as the audit service records it.
    pub fn operation(&self) -> &str {
        match self {
            Self::FileDeleted => "FileDeleted",
            Self::TagApplied => "TagApplied",
            Self::TagRemoved => "TagRemoved",
            Self::Other(name) => name,
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![Self::FileDeleted, Self::TagApplied, Self::TagRemoved]
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "FileDeleted" => Self::FileDeleted,
            "TagApplied" => Self::TagApplied,
            "TagRemoved" => Self::TagRemoved,
            _ => Self::Other(value),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.operation().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation())
    }
}

/// Time window of a search, `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AuditWindow {
    /// Window covering the last `months` calendar months up to `end`.
    pub fn months_before(end: DateTime<Utc>, months: u32) -> Result<Self, AppError> {
        let start = end.checked_sub_months(Months::new(months)).ok_or_else(|| {
            AppError::Config(format!("window of {} months is out of range", months))
        })?;
        Ok(Self { start, end })
    }
}

/// Everything the export job needs, resolved from configuration and CLI overrides.
#[derive(Debug, Clone)]
pub struct AuditJobOptions {
    pub window_months: u32,
    pub operations: Vec<EventKind>,
    pub export_path: PathBuf,
    /// `None` paginates to completeness.
    pub result_cap: Option<usize>,
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl From<&AuditExportConfig> for AuditJobOptions {
    fn from(config: &AuditExportConfig) -> Self {
        Self {
            window_months: config.window_months,
            operations: config.operations.clone(),
            export_path: config.export_path.clone(),
            result_cap: config.result_cap,
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
            max_wait: Duration::from_secs(config.max_wait_seconds),
        }
    }
}

/// Outcome of an export run.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditExportSummary {
    pub query_id: String,
    pub window: AuditWindow,
    pub export_path: PathBuf,
    pub rows: usize,
    /// More matching records existed than the result cap allowed.
    pub truncated: bool,
}
