//! endpoint-ops
//!
//! Administrative commands for managed endpoints: lift device network isolation,
//! report local host health, and export data lifecycle audit events.

#![deny(clippy::all)]

mod audit;
mod auth;
mod cli;
mod config;
mod error;
mod facts;
mod graph;
mod logging;
mod remote_action;

use clap::Parser;
use tracing::{error, info, warn};

use audit::AuditJobOptions;
use auth::{CertificateCredential, ClientCredential, ClientSecret, CredentialSecret, IdentityClient};
use cli::{AuditExportArgs, Cli, Command, CredentialArgs, UnisolateArgs};
use config::Config;
use error::AppError;
use facts::{HostFactsSource, ReportOptions};
use graph::{DeviceId, GraphClient};
use remote_action::UnisolateRequest;

fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            eprintln!("\nTenant and application id can be set with:");
            eprintln!("  AZURE_TENANT_ID=<your-tenant-id>");
            eprintln!("  AZURE_CLIENT_ID=<your-application-id>");
            std::process::exit(AppError::Config(e.to_string()).exit_code());
        }
    };

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    logging::init(&log_format, &log_level);

    info!("Starting {} v{}", config.app.name, env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create Tokio runtime: {}", e);
            std::process::exit(AppError::Io(e).exit_code());
        }
    };

    if let Err(e) = runtime.block_on(run(cli.command, &config)) {
        let status = match &e {
            AppError::Api(api) => api.status(),
            _ => None,
        };
        error!(status = ?status, "{}", e);
        eprintln!("Error: {}", e.user_message());
        eprintln!("  {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(command: Command, config: &Config) -> Result<(), AppError> {
    match command {
        Command::Unisolate(args) => unisolate_command(args, config).await,
        Command::Facts => facts_command(config).await,
        Command::AuditExport(args) => audit_export_command(args, config).await,
    }
}

/// Build the application credential from flags, environment and configuration.
fn build_credential(args: CredentialArgs, config: &Config) -> Result<ClientCredential, AppError> {
    let tenant_id = args
        .tenant_id
        .unwrap_or_else(|| config.identity.tenant_id.clone());
    let client_id = args
        .app_id
        .unwrap_or_else(|| config.identity.client_id.clone());

    let secret = match (args.client_secret, args.certificate_thumbprint, args.certificate_path) {
        (Some(secret), _, _) => CredentialSecret::ClientSecret(ClientSecret::new(secret)?),
        (None, Some(thumbprint), Some(path)) => {
            CredentialSecret::Certificate(CertificateCredential::from_pem_file(thumbprint, &path)?)
        }
        _ => {
            return Err(AppError::InvalidArgument(
                "provide --certificate-thumbprint with --certificate-path, or --client-secret"
                    .to_string(),
            ))
        }
    };

    Ok(ClientCredential::new(tenant_id, client_id, secret)?)
}

async fn unisolate_command(args: UnisolateArgs, config: &Config) -> Result<(), AppError> {
    let device = DeviceId::new(args.device_id)?;
    let credential = build_credential(args.credential, config)?;
    let identity = IdentityClient::new(config)?;
    let graph = GraphClient::new(config)?;

    let request = UnisolateRequest {
        device,
        comment: args.comment,
        dry_run: args.dry_run,
    };

    let outcome =
        remote_action::unisolate(&identity, &graph, &credential, &config.graph_scope(), &request)
            .await?;

    if outcome.applied() {
        println!(
            "Unisolate accepted for device {} (HTTP {})",
            outcome.device,
            outcome.status.unwrap_or_default()
        );
    } else {
        println!("Dry run: would POST {}", outcome.url);
    }

    Ok(())
}

async fn facts_command(config: &Config) -> Result<(), AppError> {
    let source = HostFactsSource::new(&config.facts);
    let options = ReportOptions::from(&config.facts);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let summary = facts::write_report(&source, &options, &mut out).await?;

    info!(
        sections = summary.sections,
        unavailable = summary.unavailable.len(),
        "Facts report complete"
    );
    Ok(())
}

async fn audit_export_command(args: AuditExportArgs, config: &Config) -> Result<(), AppError> {
    let mut options = AuditJobOptions::from(&config.audit);
    args.apply_to(&mut options)?;

    let credential = build_credential(args.credential, config)?;
    let identity = IdentityClient::new(config)?;
    let graph = GraphClient::new(config)?;

    let summary =
        audit::run_audit_export(&identity, &graph, &credential, &config.graph_scope(), &options)
            .await?;

    println!(
        "Exported {} events ({} to {}) to {}",
        summary.rows,
        summary.window.start.format("%Y-%m-%d"),
        summary.window.end.format("%Y-%m-%d"),
        summary.export_path.display()
    );

    if summary.truncated {
        let cap = options
            .result_cap
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".to_string());
        warn!(query_id = %summary.query_id, "Export truncated at result cap");
        println!(
            "WARNING: result cap of {} reached; more matching events exist than were exported. \
             Raise --result-cap or use --unbounded.",
            cap
        );
    }

    Ok(())
}
