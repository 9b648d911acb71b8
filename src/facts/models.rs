//! Typed host facts, one record type per report section.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Boot time and elapsed uptime.
#[derive(Debug, Clone, PartialEq)]
pub struct Uptime {
    pub boot_time: DateTime<Utc>,
    pub uptime_seconds: u64,
}

/// General system information.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemInfo {
    pub host_name: String,
    pub os_name: String,
    pub os_version: String,
    pub kernel_version: String,
    pub cpu: CpuFacts,
    pub memory: MemoryFacts,
    pub swap: MemoryFacts,
    pub disks: Vec<DiskFacts>,
    pub process_count: usize,
    /// `None` when the logged-in user count could not be determined.
    pub logged_in_users: Option<usize>,
    pub adapters: Vec<AdapterFacts>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpuFacts {
    pub brand: String,
    pub logical_cores: usize,
    pub usage_percent: f64,
}

/// Memory or swap in bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryFacts {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl MemoryFacts {
    pub fn used_percent(&self) -> f64 {
        percent(self.used_bytes, self.total_bytes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskFacts {
    pub name: String,
    pub mount_point: String,
    pub file_system: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl DiskFacts {
    pub fn free_percent(&self) -> f64 {
        percent(self.available_bytes, self.total_bytes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdapterFacts {
    pub name: String,
    pub mac_address: String,
    /// Addresses in CIDR notation.
    pub addresses: Vec<String>,
}

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Critical,
    Error,
    Warning,
}

impl EventLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::Error => "Error",
            Self::Warning => "Warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub time: DateTime<Utc>,
    pub level: EventLevel,
    pub source: String,
    pub event_id: Option<u32>,
    pub message: String,
}

/// Link state of a network adapter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LinkDetails {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "LinkSpeed", default)]
    pub link_speed: Option<String>,
    #[serde(rename = "MacAddress", default)]
    pub mac_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessFacts {
    pub pid: u32,
    pub name: String,
    /// Share of total CPU capacity.
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStatus {
    pub name: String,
    pub display_name: Option<String>,
    pub state: ServiceState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceState {
    Running,
    Stopped,
    NotFound,
    Other(String),
}

impl ServiceState {
    /// Map the platform's state name.
    pub fn from_platform(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" | "active" => Self::Running,
            "stopped" | "inactive" | "failed" => Self::Stopped,
            "not-found" | "notfound" => Self::NotFound,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::NotFound => "Not found",
            Self::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StorageHealth {
    #[serde(rename = "InstanceName")]
    pub device: String,
    #[serde(rename = "PredictFailure")]
    pub predict_failure: bool,
    #[serde(rename = "Reason", default)]
    pub reason: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FirewallProfile {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Enabled")]
    pub enabled: bool,
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentages() {
        let memory = MemoryFacts {
            total_bytes: 16,
            used_bytes: 4,
        };
        assert_eq!(memory.used_percent(), 25.0);

        let empty = MemoryFacts {
            total_bytes: 0,
            used_bytes: 0,
        };
        assert_eq!(empty.used_percent(), 0.0);
    }

    #[test]
    fn test_service_state_mapping() {
        assert_eq!(ServiceState::from_platform("Running"), ServiceState::Running);
        assert_eq!(ServiceState::from_platform("inactive"), ServiceState::Stopped);
        assert_eq!(ServiceState::from_platform("not-found"), ServiceState::NotFound);
        assert_eq!(
            ServiceState::from_platform("StartPending"),
            ServiceState::Other("startpending".into())
        );
    }

    #[test]
    fn test_storage_health_from_wmi_json() {
        let health: StorageHealth = serde_json::from_str(
            r#"{"InstanceName":"SCSI\\Disk&Ven_NVMe\\4&1_0","PredictFailure":false,"Reason":0}"#,
        )
        .unwrap();
        assert!(!health.predict_failure);
        assert_eq!(health.reason, Some(0));
    }
}
