use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::audit::{AuditJobOptions, EventKind};
use crate::error::AppError;

/// Endpoint administration: device unisolation, host facts and audit export
#[derive(Parser, Debug)]
#[command(name = "endpoint-ops", author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file replacing the embedded defaults
    #[arg(long, global = true, env = "ENDPOINT_OPS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format (json or pretty)
    #[arg(long, global = true, env = "LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Log level, used when RUST_LOG is not set
    #[arg(long, global = true, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Lift network isolation from a managed device
    Unisolate(UnisolateArgs),

    /// Print a health report for this machine
    Facts,

    /// Export data lifecycle audit events to CSV
    AuditExport(AuditExportArgs),
}

/// Application credential. Tenant and application id fall back to configuration.
#[derive(Args, Debug)]
pub struct CredentialArgs {
    /// Directory (tenant) id
    #[arg(long, env = "AZURE_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Application (client) id
    #[arg(long = "app-id", env = "AZURE_CLIENT_ID")]
    pub app_id: Option<String>,

    /// SHA-1 thumbprint of the application certificate, hex encoded
    #[arg(
        long,
        env = "AZURE_CLIENT_CERTIFICATE_THUMBPRINT",
        required_unless_present = "client_secret"
    )]
    pub certificate_thumbprint: Option<String>,

    /// PEM file holding the certificate's private key
    #[arg(
        long,
        env = "AZURE_CLIENT_CERTIFICATE_PATH",
        required_unless_present = "client_secret"
    )]
    pub certificate_path: Option<PathBuf>,

    /// Client secret, used instead of a certificate
    #[arg(
        long,
        env = "AZURE_CLIENT_SECRET",
        hide_env_values = true,
        conflicts_with_all = ["certificate_thumbprint", "certificate_path"]
    )]
    pub client_secret: Option<String>,
}

#[derive(Args, Debug)]
pub struct UnisolateArgs {
    /// Managed device id
    #[arg(long, env = "DEVICE_ID")]
    pub device_id: String,

    /// Comment recorded with the action
    #[arg(long)]
    pub comment: Option<String>,

    /// Authenticate and show the request without sending it
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub credential: CredentialArgs,
}

#[derive(Args, Debug)]
pub struct AuditExportArgs {
    /// CSV file to write
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Months to search back from now
    #[arg(long)]
    pub months: Option<u32>,

    /// Maximum number of records to export
    #[arg(long, conflicts_with = "unbounded")]
    pub result_cap: Option<usize>,

    /// Export every matching record
    #[arg(long)]
    pub unbounded: bool,

    /// Audit operation to include (repeatable, replaces the configured set)
    #[arg(long = "operation")]
    pub operations: Vec<String>,

    #[command(flatten)]
    pub credential: CredentialArgs,
}

impl AuditExportArgs {
    /// Apply command-line overrides on top of the configured job options.
    pub fn apply_to(&self, options: &mut AuditJobOptions) -> Result<(), AppError> {
        if let Some(output) = &self.output {
            options.export_path = output.clone();
        }

        if let Some(months) = self.months {
            if months == 0 {
                return Err(AppError::InvalidArgument(
                    "--months must be greater than zero".to_string(),
                ));
            }
            options.window_months = months;
        }

        if self.unbounded {
            options.result_cap = None;
        } else if let Some(cap) = self.result_cap {
            if cap == 0 {
                return Err(AppError::InvalidArgument(
                    "--result-cap must be greater than zero".to_string(),
                ));
            }
            options.result_cap = Some(cap);
        }

        if !self.operations.is_empty() {
            options.operations = self
                .operations
                .iter()
                .map(|op| EventKind::from(op.trim().to_string()))
                .collect();
        }

        Ok(())
    }
}
