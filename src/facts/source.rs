//! Source abstraction for host facts.
//!
//! The reporter only talks to this trait, so it runs the same against the live host
//! and against fixed test data.

use async_trait::async_trait;

use super::models::{
    FirewallProfile, LinkDetails, LogEvent, ProcessFacts, ServiceStatus, StorageHealth,
    SystemInfo, Uptime,
};
use crate::error::FactsError;

/// One read-only query per report section. Each call is independent.
#[async_trait]
pub trait FactsSource: Send + Sync {
    async fn uptime(&self) -> Result<Uptime, FactsError>;

    async fn system_info(&self) -> Result<SystemInfo, FactsError>;

    /// Most recent error and warning log entries, newest first.
    async fn recent_events(&self, limit: usize) -> Result<Vec<LogEvent>, FactsError>;

    async fn link_details(&self) -> Result<Vec<LinkDetails>, FactsError>;

    /// Processes with the highest CPU usage, highest first.
    async fn top_processes(&self, limit: usize) -> Result<Vec<ProcessFacts>, FactsError>;

    /// Status of each named service, in the order given.
    async fn service_statuses(&self, names: &[String]) -> Result<Vec<ServiceStatus>, FactsError>;

    /// Titles of updates that are available but not installed.
    async fn pending_updates(&self) -> Result<Vec<String>, FactsError>;

    async fn storage_health(&self) -> Result<Vec<StorageHealth>, FactsError>;

    async fn firewall_profiles(&self) -> Result<Vec<FirewallProfile>, FactsError>;
}
