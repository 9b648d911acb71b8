//! Console rendering of the host facts report.
//!
//! Sections are queried one at a time in a fixed order and each is written as soon as
//! it is collected. A section that fails renders its reason and the run moves on.

use std::io::{self, Write};

use tracing::{debug, warn};

use super::models::{
    FirewallProfile, LinkDetails, LogEvent, ProcessFacts, ServiceStatus, StorageHealth,
    SystemInfo, Uptime,
};
use super::source::FactsSource;
use crate::config::FactsConfig;
use crate::error::FactsError;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const LABEL_WIDTH: usize = 18;

/// Report sections in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Uptime,
    SystemInfo,
    RecentEvents,
    LinkDetails,
    TopProcesses,
    Services,
    PendingUpdates,
    StorageHealth,
    Firewall,
}

impl Section {
    pub const ALL: [Section; 9] = [
        Section::Uptime,
        Section::SystemInfo,
        Section::RecentEvents,
        Section::LinkDetails,
        Section::TopProcesses,
        Section::Services,
        Section::PendingUpdates,
        Section::StorageHealth,
        Section::Firewall,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Section::Uptime => "Uptime",
            Section::SystemInfo => "System Information",
            Section::RecentEvents => "Recent Errors and Warnings",
            Section::LinkDetails => "Network Adapter Details",
            Section::TopProcesses => "Top Processes by CPU",
            Section::Services => "Service Status",
            Section::PendingUpdates => "Pending Updates",
            Section::StorageHealth => "Storage Failure Prediction",
            Section::Firewall => "Firewall Profiles",
        }
    }
}

/// Tunables for a report run.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub recent_event_count: usize,
    pub top_process_count: usize,
    pub watched_services: Vec<String>,
}

impl From<&FactsConfig> for ReportOptions {
    fn from(config: &FactsConfig) -> Self {
        Self {
            recent_event_count: config.recent_event_count,
            top_process_count: config.top_process_count,
            watched_services: config.watched_services.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub sections: usize,
    pub unavailable: Vec<&'static str>,
}

/// Bytes as binary gigabytes with two decimals.
pub fn format_gib(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / GIB)
}

pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value)
}

/// Uptime as "N days, HH:MM:SS".
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    let secs = seconds % 60;
    let unit = if days == 1 { "day" } else { "days" };
    format!("{} {}, {:02}:{:02}:{:02}", days, unit, hours, minutes, secs)
}

/// Collect and write every section to `out`.
pub async fn write_report<S, W>(
    source: &S,
    options: &ReportOptions,
    out: &mut W,
) -> io::Result<ReportSummary>
where
    S: FactsSource + ?Sized,
    W: Write,
{
    let mut unavailable = Vec::new();

    for section in Section::ALL {
        debug!("Collecting section: {}", section.title());

        let body = match section {
            Section::Uptime => render(source.uptime().await, uptime_lines),
            Section::SystemInfo => render(source.system_info().await, system_info_lines),
            Section::RecentEvents => render(
                source.recent_events(options.recent_event_count).await,
                |events| list_lines(events, event_line),
            ),
            Section::LinkDetails => render(source.link_details().await, |links| {
                list_lines(links, link_line)
            }),
            Section::TopProcesses => render(
                source.top_processes(options.top_process_count).await,
                |processes| list_lines(processes, process_line),
            ),
            Section::Services => render(
                source.service_statuses(&options.watched_services).await,
                |services| list_lines(services, service_line),
            ),
            Section::PendingUpdates => render(source.pending_updates().await, |titles| {
                list_lines(titles, |title| format!("  {}", title))
            }),
            Section::StorageHealth => render(source.storage_health().await, |disks| {
                list_lines(disks, storage_line)
            }),
            Section::Firewall => render(source.firewall_profiles().await, |profiles| {
                list_lines(profiles, firewall_line)
            }),
        };

        let lines = match body {
            Ok(lines) => lines,
            Err(e) => {
                debug!("Section {} unavailable: {}", section.title(), e);
                unavailable.push(section.title());
                vec![format!("  (unavailable: {})", e)]
            }
        };

        writeln!(out, "=== {} ===", section.title())?;
        for line in &lines {
            writeln!(out, "{}", line)?;
        }
        writeln!(out)?;
        out.flush()?;
    }

    if !unavailable.is_empty() {
        warn!(
            "{} of {} sections unavailable: {}",
            unavailable.len(),
            Section::ALL.len(),
            unavailable.join(", ")
        );
    }

    Ok(ReportSummary {
        sections: Section::ALL.len(),
        unavailable,
    })
}

fn render<T>(
    result: Result<T, FactsError>,
    lines: impl FnOnce(&T) -> Vec<String>,
) -> Result<Vec<String>, FactsError> {
    result.map(|value| lines(&value))
}

fn list_lines<T>(items: &[T], line: impl Fn(&T) -> String) -> Vec<String> {
    if items.is_empty() {
        return vec!["  (none)".to_string()];
    }
    items.iter().map(line).collect()
}

fn field(label: &str, value: impl std::fmt::Display) -> String {
    format!("  {:<width$}{}", format!("{}:", label), value, width = LABEL_WIDTH)
}

fn uptime_lines(uptime: &Uptime) -> Vec<String> {
    vec![
        field(
            "Last boot",
            uptime.boot_time.format("%Y-%m-%d %H:%M:%S UTC"),
        ),
        field("Uptime", format_uptime(uptime.uptime_seconds)),
    ]
}

fn system_info_lines(info: &SystemInfo) -> Vec<String> {
    let mut lines = vec![
        field("Host name", &info.host_name),
        field(
            "OS",
            format!(
                "{} {} (kernel {})",
                info.os_name, info.os_version, info.kernel_version
            ),
        ),
        field(
            "CPU",
            format!("{} ({} logical cores)", info.cpu.brand, info.cpu.logical_cores),
        ),
        field("CPU usage", format_percent(info.cpu.usage_percent)),
        field(
            "Memory",
            format!(
                "{} GB used of {} GB ({})",
                format_gib(info.memory.used_bytes),
                format_gib(info.memory.total_bytes),
                format_percent(info.memory.used_percent())
            ),
        ),
        field(
            "Swap",
            format!(
                "{} GB used of {} GB ({})",
                format_gib(info.swap.used_bytes),
                format_gib(info.swap.total_bytes),
                format_percent(info.swap.used_percent())
            ),
        ),
        field("Processes", info.process_count),
        field(
            "Logged-in users",
            info.logged_in_users
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        ),
    ];

    lines.push("  Disks:".to_string());
    if info.disks.is_empty() {
        lines.push("    (none)".to_string());
    }
    for disk in &info.disks {
        lines.push(format!(
            "    {} ({}, {}): {} GB free of {} GB ({} free)",
            disk.mount_point,
            disk.name,
            disk.file_system,
            format_gib(disk.available_bytes),
            format_gib(disk.total_bytes),
            format_percent(disk.free_percent())
        ));
    }

    lines.push("  Network adapters:".to_string());
    if info.adapters.is_empty() {
        lines.push("    (none)".to_string());
    }
    for adapter in &info.adapters {
        let addresses = if adapter.addresses.is_empty() {
            "-".to_string()
        } else {
            adapter.addresses.join(", ")
        };
        lines.push(format!(
            "    {} [{}] {}",
            adapter.name, adapter.mac_address, addresses
        ));
    }

    lines
}

fn event_line(event: &LogEvent) -> String {
    let id = event
        .event_id
        .map(|id| format!(" ({})", id))
        .unwrap_or_default();
    format!(
        "  {}  {:<8} {}{}: {}",
        event.time.format("%Y-%m-%d %H:%M:%S"),
        event.level.as_str(),
        event.source,
        id,
        event.message
    )
}

fn link_line(link: &LinkDetails) -> String {
    format!(
        "  {}: {}, {}, MAC {}",
        link.name,
        link.status,
        link.link_speed.as_deref().unwrap_or("-"),
        link.mac_address.as_deref().unwrap_or("-")
    )
}

fn process_line(process: &ProcessFacts) -> String {
    format!(
        "  {} (PID {}): CPU {}, memory {} GB",
        process.name,
        process.pid,
        format_percent(process.cpu_percent),
        format_gib(process.memory_bytes)
    )
}

fn service_line(service: &ServiceStatus) -> String {
    match &service.display_name {
        Some(display) => format!("  {} ({}): {}", service.name, display, service.state.label()),
        None => format!("  {}: {}", service.name, service.state.label()),
    }
}

fn storage_line(disk: &StorageHealth) -> String {
    if disk.predict_failure {
        let reason = disk
            .reason
            .map(|r| format!(" (reason {})", r))
            .unwrap_or_default();
        format!("  {}: FAILURE PREDICTED{}", disk.device, reason)
    } else {
        format!("  {}: OK", disk.device)
    }
}

fn firewall_line(profile: &FirewallProfile) -> String {
    let state = if profile.enabled { "Enabled" } else { "Disabled" };
    format!("  {}: {}", profile.name, state)
}
