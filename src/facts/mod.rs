//! Local host health report.

pub mod commands;
pub mod host;
pub mod models;
pub mod report;
pub mod source;

pub use host::HostFactsSource;
pub use report::{write_report, ReportOptions};
