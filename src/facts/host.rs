//! Facts collected from the machine this process runs on.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sysinfo::{Disks, Networks, ProcessesToUpdate, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::debug;

use super::commands;
use super::models::{
    AdapterFacts, CpuFacts, DiskFacts, FirewallProfile, LinkDetails, LogEvent, MemoryFacts,
    ProcessFacts, ServiceStatus, StorageHealth, SystemInfo, Uptime,
};
use super::source::FactsSource;
use crate::config::FactsConfig;
use crate::error::FactsError;

const SYS_CLASS_NET: &str = "/sys/class/net";

/// Reads facts through `sysinfo` and the platform's own tools.
pub struct HostFactsSource {
    command_timeout: Duration,
}

impl HostFactsSource {
    pub fn new(config: &FactsConfig) -> Self {
        Self {
            command_timeout: Duration::from_secs(config.command_timeout_seconds),
        }
    }

    async fn logged_in_users(&self) -> Result<usize, FactsError> {
        if cfg!(windows) {
            let stdout = commands::powershell(commands::WINDOWS_USERS_SCRIPT, self.command_timeout).await?;
            commands::parse_count(&stdout)
        } else if cfg!(unix) {
            let stdout = commands::run("who", &[], self.command_timeout).await?;
            Ok(commands::parse_who(&stdout))
        } else {
            Err(FactsError::Unsupported)
        }
    }
}

/// Sample CPU usage twice, the minimum interval apart.
async fn sampled_system() -> System {
    let mut sys = System::new();
    sys.refresh_cpu_usage();
    sys.refresh_processes(ProcessesToUpdate::All, true);
    tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
    sys.refresh_cpu_usage();
    sys.refresh_processes(ProcessesToUpdate::All, true);
    sys
}

fn disk_facts() -> Vec<DiskFacts> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .map(|disk| DiskFacts {
            name: disk.name().to_string_lossy().into_owned(),
            mount_point: disk.mount_point().display().to_string(),
            file_system: disk.file_system().to_string_lossy().into_owned(),
            total_bytes: disk.total_space(),
            available_bytes: disk.available_space(),
        })
        .collect()
}

fn adapter_facts() -> Vec<AdapterFacts> {
    let networks = Networks::new_with_refreshed_list();
    let mut adapters: Vec<AdapterFacts> = networks
        .list()
        .iter()
        .map(|(name, data)| AdapterFacts {
            name: name.clone(),
            mac_address: data.mac_address().to_string(),
            addresses: data
                .ip_networks()
                .iter()
                .map(|net| format!("{}/{}", net.addr, net.prefix))
                .collect(),
        })
        .collect();
    adapters.sort_by(|a, b| a.name.cmp(&b.name));
    adapters
}

#[async_trait]
impl FactsSource for HostFactsSource {
    async fn uptime(&self) -> Result<Uptime, FactsError> {
        let boot = System::boot_time();
        let boot_time = DateTime::<Utc>::from_timestamp(boot as i64, 0)
            .ok_or_else(|| FactsError::Unavailable(format!("invalid boot time {}", boot)))?;

        Ok(Uptime {
            boot_time,
            uptime_seconds: System::uptime(),
        })
    }

    async fn system_info(&self) -> Result<SystemInfo, FactsError> {
        let mut sys = sampled_system().await;
        sys.refresh_memory();

        let logged_in_users = match self.logged_in_users().await {
            Ok(count) => Some(count),
            Err(e) => {
                debug!("Logged-in user count unavailable: {}", e);
                None
            }
        };

        let brand = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .unwrap_or_default();

        Ok(SystemInfo {
            host_name: System::host_name().unwrap_or_default(),
            os_name: System::name().unwrap_or_default(),
            os_version: System::os_version().unwrap_or_default(),
            kernel_version: System::kernel_version().unwrap_or_default(),
            cpu: CpuFacts {
                brand,
                logical_cores: sys.cpus().len(),
                usage_percent: f64::from(sys.global_cpu_usage()),
            },
            memory: MemoryFacts {
                total_bytes: sys.total_memory(),
                used_bytes: sys.used_memory(),
            },
            swap: MemoryFacts {
                total_bytes: sys.total_swap(),
                used_bytes: sys.used_swap(),
            },
            disks: disk_facts(),
            process_count: sys.processes().len(),
            logged_in_users,
            adapters: adapter_facts(),
        })
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<LogEvent>, FactsError> {
        if cfg!(windows) {
            let script = commands::windows_events_script(limit);
            let stdout = commands::powershell(&script, self.command_timeout).await?;
            commands::parse_windows_events(&stdout)
        } else if cfg!(target_os = "linux") {
            let count = limit.to_string();
            let stdout = commands::run(
                "journalctl",
                &["-p", "warning", "-n", &count, "-r", "-o", "json", "--no-pager"],
                self.command_timeout,
            )
            .await?;
            let mut events = commands::parse_journal(&stdout)?;
            events.truncate(limit);
            Ok(events)
        } else {
            Err(FactsError::Unsupported)
        }
    }

    async fn link_details(&self) -> Result<Vec<LinkDetails>, FactsError> {
        if cfg!(windows) {
            let stdout = commands::powershell(commands::WINDOWS_LINK_SCRIPT, self.command_timeout).await?;
            commands::parse_json_list(&stdout)
        } else if cfg!(target_os = "linux") {
            commands::read_sys_class_net(Path::new(SYS_CLASS_NET))
        } else {
            Err(FactsError::Unsupported)
        }
    }

    async fn top_processes(&self, limit: usize) -> Result<Vec<ProcessFacts>, FactsError> {
        let sys = sampled_system().await;
        let cores = sys.cpus().len().max(1) as f64;

        let mut processes: Vec<ProcessFacts> = sys
            .processes()
            .iter()
            .map(|(pid, process)| ProcessFacts {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().into_owned(),
                cpu_percent: f64::from(process.cpu_usage()) / cores,
                memory_bytes: process.memory(),
            })
            .collect();

        processes.sort_by(|a, b| {
            b.cpu_percent
                .total_cmp(&a.cpu_percent)
                .then_with(|| a.pid.cmp(&b.pid))
        });
        processes.truncate(limit);
        Ok(processes)
    }

    async fn service_statuses(&self, names: &[String]) -> Result<Vec<ServiceStatus>, FactsError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        if cfg!(windows) {
            let script = commands::windows_services_script(names);
            let stdout = commands::powershell(&script, self.command_timeout).await?;
            commands::parse_windows_services(&stdout, names)
        } else if cfg!(target_os = "linux") {
            let mut args = vec!["show", "--property=Id,Description,LoadState,ActiveState"];
            args.extend(names.iter().map(String::as_str));
            let stdout = commands::run("systemctl", &args, self.command_timeout).await?;
            commands::parse_systemctl_show(&stdout, names)
        } else {
            Err(FactsError::Unsupported)
        }
    }

    async fn pending_updates(&self) -> Result<Vec<String>, FactsError> {
        if cfg!(windows) {
            let stdout = commands::powershell(commands::WINDOWS_UPDATES_SCRIPT, self.command_timeout).await?;
            commands::parse_json_list(&stdout)
        } else if cfg!(target_os = "linux") {
            let stdout = commands::run("apt", &["list", "--upgradable"], self.command_timeout).await?;
            Ok(commands::parse_apt_upgradable(&stdout))
        } else {
            Err(FactsError::Unsupported)
        }
    }

    async fn storage_health(&self) -> Result<Vec<StorageHealth>, FactsError> {
        if cfg!(windows) {
            let stdout = commands::powershell(commands::WINDOWS_STORAGE_SCRIPT, self.command_timeout).await?;
            commands::parse_json_list(&stdout)
        } else {
            Err(FactsError::Unsupported)
        }
    }

    async fn firewall_profiles(&self) -> Result<Vec<FirewallProfile>, FactsError> {
        if cfg!(windows) {
            let stdout = commands::powershell(commands::WINDOWS_FIREWALL_SCRIPT, self.command_timeout).await?;
            commands::parse_windows_firewall(&stdout)
        } else if cfg!(target_os = "linux") {
            let stdout = commands::run("ufw", &["status"], self.command_timeout).await?;
            commands::parse_ufw_status(&stdout)
        } else {
            Err(FactsError::Unsupported)
        }
    }
}
