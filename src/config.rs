//! Configuration loading and management.
//!
//! Loads configuration from embedded config.toml (or a file given on the command line)
//! with environment variable overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audit::EventKind;

/// Embedded configuration file content.
const CONFIG_TOML: &str = include_str!("../config.toml");

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub identity: IdentityConfig,
    pub api: ApiConfig,
    pub http: HttpConfig,
    pub audit: AuditExportConfig,
    pub facts: FactsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    pub authority_host: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub graph_base_url: String,
    /// Resource whose `.default` scope sessions are requested for.
    pub graph_resource: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

/// Audit export settings. `result_cap = None` means paginate to completeness.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditExportConfig {
    pub window_months: u32,
    #[serde(default = "EventKind::defaults")]
    pub operations: Vec<EventKind>,
    pub export_path: PathBuf,
    #[serde(default)]
    pub result_cap: Option<usize>,
    pub poll_interval_seconds: u64,
    pub max_wait_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FactsConfig {
    pub recent_event_count: usize,
    pub top_process_count: usize,
    pub watched_services: Vec<String>,
    pub command_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    /// Load configuration with environment variable overrides.
    ///
    /// When `path` is given that file replaces the embedded defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::parse(&raw)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::parse(CONFIG_TOML).context("Failed to parse embedded config.toml")?,
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text without validation.
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(tenant) = env::var("AZURE_TENANT_ID") {
            self.identity.tenant_id = tenant;
        }

        if let Ok(client_id) = env::var("AZURE_CLIENT_ID") {
            self.identity.client_id = client_id;
        }

        if let Ok(authority) = env::var("AZURE_AUTHORITY_HOST") {
            self.identity.authority_host = authority;
        }

        if let Ok(graph) = env::var("GRAPH_BASE_URL") {
            self.api.graph_base_url = graph;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            self.logging.level = log_level;
        }
    }

    /// Validate that values are usable. Credentials are checked per command.
    pub fn validate(&self) -> Result<()> {
        if self.identity.authority_host.trim().is_empty() {
            anyhow::bail!("identity.authority_host must not be empty");
        }

        if self.api.graph_base_url.trim().is_empty() {
            anyhow::bail!("api.graph_base_url must not be empty");
        }

        if self.http.timeout_seconds == 0 {
            anyhow::bail!("http.timeout_seconds must be greater than zero");
        }

        if self.audit.window_months == 0 {
            anyhow::bail!("audit.window_months must be greater than zero");
        }

        if self.audit.operations.is_empty() {
            anyhow::bail!("audit.operations must name at least one operation");
        }

        if self.audit.result_cap == Some(0) {
            anyhow::bail!("audit.result_cap must be greater than zero (omit it for unbounded)");
        }

        if self.audit.poll_interval_seconds == 0 {
            anyhow::bail!("audit.poll_interval_seconds must be greater than zero");
        }

        Ok(())
    }

    /// Scope requested for Graph sessions.
    pub fn graph_scope(&self) -> String {
        format!("{}/.default", self.api.graph_resource.trim_end_matches('/'))
    }
}
