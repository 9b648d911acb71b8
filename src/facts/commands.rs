//! OS command execution and output parsing for the command-backed sections.
//!
//! Windows sections run PowerShell and emit JSON through `ConvertTo-Json`. Linux
//! sections read `journalctl`, `systemctl`, `apt`, `who` and `/sys/class/net`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::models::{EventLevel, FirewallProfile, LinkDetails, LogEvent, ServiceState, ServiceStatus};
use crate::error::FactsError;

/// Run a program and return its stdout, bounded by `timeout`.
pub async fn run(program: &str, args: &[&str], timeout: Duration) -> Result<String, FactsError> {
    debug!("Running: {} {}", program, args.join(" "));

    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| FactsError::CommandTimedOut {
            command: program.to_string(),
            seconds: timeout.as_secs(),
        })?
        .map_err(|e| FactsError::CommandFailed {
            command: program.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = stderr
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("exited with non-zero status")
            .to_string();
        return Err(FactsError::CommandFailed {
            command: program.to_string(),
            message,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a PowerShell script and return its stdout.
pub async fn powershell(script: &str, timeout: Duration) -> Result<String, FactsError> {
    run(
        "powershell.exe",
        &["-NoProfile", "-NonInteractive", "-Command", script],
        timeout,
    )
    .await
}

/// Parse `ConvertTo-Json` output that may be a single object, an array or empty.
pub fn parse_json_list<T: DeserializeOwned>(stdout: &str) -> Result<Vec<T>, FactsError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| FactsError::Parse(e.to_string()))?;
    let items = match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    };

    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(|e| FactsError::Parse(e.to_string())))
        .collect()
}

/// Recent critical, error and warning events. An empty log yields `[]`.
pub fn windows_events_script(limit: usize) -> String {
    format!(
        "$ErrorActionPreference = 'Stop'; \
         try {{ $raw = Get-WinEvent -FilterHashtable @{{LogName='System','Application'; Level=1,2,3}} -MaxEvents {limit} }} \
         catch {{ if ($_.FullyQualifiedErrorId -like 'NoMatchingEventsFound*') {{ $raw = @() }} else {{ throw }} }}; \
         $events = $raw | Sort-Object TimeCreated -Descending | Select-Object -First {limit} | ForEach-Object {{ \
         [pscustomobject]@{{ Time = $_.TimeCreated.ToUniversalTime().ToString('o'); Level = [int]$_.Level; \
         Source = $_.ProviderName; Id = $_.Id; Message = (($_.Message -split \"`r?`n\")[0]) }} }}; \
         ConvertTo-Json -InputObject @($events) -Compress"
    )
}

pub const WINDOWS_LINK_SCRIPT: &str = "Get-NetAdapter | \
     Select-Object Name, Status, LinkSpeed, MacAddress | ConvertTo-Json -Compress";

pub fn windows_services_script(names: &[String]) -> String {
    let quoted = names
        .iter()
        .map(|name| format!("'{}'", name.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "Get-Service -Name {quoted} -ErrorAction SilentlyContinue | \
         Select-Object Name, DisplayName, @{{n='Status';e={{$_.Status.ToString()}}}} | \
         ConvertTo-Json -Compress"
    )
}

pub const WINDOWS_UPDATES_SCRIPT: &str = "$ErrorActionPreference = 'Stop'; \
     $searcher = (New-Object -ComObject Microsoft.Update.Session).CreateUpdateSearcher(); \
     $result = $searcher.Search('IsInstalled=0 and IsHidden=0'); \
     ConvertTo-Json -InputObject @($result.Updates | ForEach-Object { $_.Title }) -Compress";

pub const WINDOWS_STORAGE_SCRIPT: &str = "Get-CimInstance -Namespace root\\wmi \
     -ClassName MSStorageDriver_FailurePredictStatus -ErrorAction Stop | \
     Select-Object InstanceName, PredictFailure, Reason | ConvertTo-Json -Compress";

// Enabled is a GpoBoolean (False, True, NotConfigured); a [bool] cast would turn NotConfigured into true.
pub const WINDOWS_FIREWALL_SCRIPT: &str = "Get-NetFirewallProfile | \
     Select-Object Name, @{n='Enabled';e={$_.Enabled.ToString()}} | ConvertTo-Json -Compress";

pub const WINDOWS_USERS_SCRIPT: &str = "@(Get-CimInstance Win32_Process -Filter \"Name='explorer.exe'\" | \
     ForEach-Object { (Invoke-CimMethod -InputObject $_ -MethodName GetOwner).User } | \
     Sort-Object -Unique).Count";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WindowsEvent {
    time: String,
    level: u8,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    id: Option<u32>,
    #[serde(default)]
    message: Option<String>,
}

pub fn parse_windows_events(stdout: &str) -> Result<Vec<LogEvent>, FactsError> {
    let raw: Vec<WindowsEvent> = parse_json_list(stdout)?;
    raw.into_iter()
        .map(|event| {
            let time = DateTime::parse_from_rfc3339(&event.time)
                .map_err(|e| FactsError::Parse(format!("event time '{}': {}", event.time, e)))?
                .with_timezone(&Utc);
            let level = match event.level {
                1 => EventLevel::Critical,
                2 => EventLevel::Error,
                _ => EventLevel::Warning,
            };
            Ok(LogEvent {
                time,
                level,
                source: event.source.unwrap_or_default(),
                event_id: event.id,
                message: event.message.unwrap_or_default().trim().to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WindowsService {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    status: String,
}

/// Match `Get-Service` output to the watch list; names it did not return are `NotFound`.
pub fn parse_windows_services(
    stdout: &str,
    names: &[String],
) -> Result<Vec<ServiceStatus>, FactsError> {
    let found: Vec<WindowsService> = parse_json_list(stdout)?;

    Ok(names
        .iter()
        .map(|name| match found.iter().find(|s| s.name.eq_ignore_ascii_case(name)) {
            Some(service) => ServiceStatus {
                name: name.clone(),
                display_name: service.display_name.clone(),
                state: ServiceState::from_platform(&service.status),
            },
            None => ServiceStatus {
                name: name.clone(),
                display_name: None,
                state: ServiceState::NotFound,
            },
        })
        .collect())
}

pub fn parse_count(stdout: &str) -> Result<usize, FactsError> {
    let trimmed = stdout.trim();
    trimmed
        .parse()
        .map_err(|_| FactsError::Parse(format!("expected a count, got '{}'", trimmed)))
}

/// `journalctl -o json` emits one JSON object per line.
pub fn parse_journal(stdout: &str) -> Result<Vec<LogEvent>, FactsError> {
    let mut events = Vec::new();

    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let entry: Value =
            serde_json::from_str(line).map_err(|e| FactsError::Parse(e.to_string()))?;

        let micros: i64 = entry
            .get("__REALTIME_TIMESTAMP")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| FactsError::Parse("journal entry without timestamp".into()))?;
        let time = Utc
            .timestamp_micros(micros)
            .single()
            .ok_or_else(|| FactsError::Parse(format!("invalid journal timestamp {}", micros)))?;

        let level = match entry.get("PRIORITY").and_then(Value::as_str) {
            Some("0") | Some("1") | Some("2") => EventLevel::Critical,
            Some("3") => EventLevel::Error,
            _ => EventLevel::Warning,
        };

        let source = ["SYSLOG_IDENTIFIER", "_COMM", "_SYSTEMD_UNIT"]
            .iter()
            .find_map(|key| entry.get(*key).and_then(Value::as_str))
            .unwrap_or("unknown")
            .to_string();

        events.push(LogEvent {
            time,
            level,
            source,
            event_id: None,
            message: journal_message(entry.get("MESSAGE")),
        });
    }

    Ok(events)
}

/// MESSAGE is a string, or a byte array when it is not valid UTF-8.
fn journal_message(value: Option<&Value>) -> String {
    let text = match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(bytes)) => {
            let bytes: Vec<u8> = bytes
                .iter()
                .filter_map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect();
            String::from_utf8_lossy(&bytes).into_owned()
        }
        _ => String::new(),
    };
    text.lines().next().unwrap_or_default().trim().to_string()
}

/// Parse `systemctl show --property=Id,Description,LoadState,ActiveState` for each watched unit.
pub fn parse_systemctl_show(
    stdout: &str,
    names: &[String],
) -> Result<Vec<ServiceStatus>, FactsError> {
    let blocks: Vec<&str> = stdout
        .split("\n\n")
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .collect();

    if blocks.len() != names.len() {
        return Err(FactsError::Parse(format!(
            "expected {} unit blocks, got {}",
            names.len(),
            blocks.len()
        )));
    }

    Ok(names
        .iter()
        .zip(blocks)
        .map(|(name, block)| {
            let property = |key: &str| {
                block.lines().find_map(|line| {
                    line.split_once('=')
                        .filter(|(k, _)| *k == key)
                        .map(|(_, v)| v.trim().to_string())
                })
            };

            let state = if property("LoadState").as_deref() == Some("not-found") {
                ServiceState::NotFound
            } else {
                ServiceState::from_platform(&property("ActiveState").unwrap_or_default())
            };

            ServiceStatus {
                name: name.clone(),
                display_name: property("Description").filter(|d| !d.is_empty()),
                state,
            }
        })
        .collect())
}

/// Parse `apt list --upgradable`, skipping the "Listing..." banner.
pub fn parse_apt_upgradable(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Listing") && !line.starts_with("WARNING"))
        .map(|line| {
            let mut parts = line.split_whitespace();
            let package = parts
                .next()
                .and_then(|p| p.split('/').next())
                .unwrap_or(line);
            match parts.next() {
                Some(version) => format!("{} {}", package, version),
                None => package.to_string(),
            }
        })
        .collect()
}

/// Count distinct users in `who` output.
pub fn parse_who(stdout: &str) -> usize {
    let mut users: Vec<&str> = stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .collect();
    users.sort_unstable();
    users.dedup();
    users.len()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WindowsFirewallProfile {
    name: String,
    enabled: String,
}

/// Only an explicit `True` counts as enabled.
pub fn parse_windows_firewall(stdout: &str) -> Result<Vec<FirewallProfile>, FactsError> {
    let raw: Vec<WindowsFirewallProfile> = parse_json_list(stdout)?;
    Ok(raw
        .into_iter()
        .map(|profile| FirewallProfile {
            enabled: profile.enabled.eq_ignore_ascii_case("true"),
            name: profile.name,
        })
        .collect())
}

/// Parse `ufw status` into a single profile.
pub fn parse_ufw_status(stdout: &str) -> Result<Vec<FirewallProfile>, FactsError> {
    let status = stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("Status:"))
        .map(str::trim)
        .ok_or_else(|| FactsError::Parse("ufw status line missing".into()))?;

    Ok(vec![FirewallProfile {
        name: "ufw".to_string(),
        enabled: status == "active",
    }])
}

/// Read adapter link state from a sysfs net class directory.
pub fn read_sys_class_net(root: &Path) -> Result<Vec<LinkDetails>, FactsError> {
    let entries = std::fs::read_dir(root)
        .map_err(|e| FactsError::Unavailable(format!("{}: {}", root.display(), e)))?;

    let read = |dir: &Path, file: &str| {
        std::fs::read_to_string(dir.join(file))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let mut links = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "lo" {
            continue;
        }
        let dir = entry.path();

        // speed is -1 or unreadable when the link is down
        let link_speed = read(&dir, "speed")
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|mbps| *mbps > 0)
            .map(|mbps| format!("{} Mbps", mbps));

        links.push(LinkDetails {
            name,
            status: read(&dir, "operstate").unwrap_or_else(|| "unknown".to_string()),
            link_speed,
            mac_address: read(&dir, "address"),
        });
    }

    links.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(links)
}
