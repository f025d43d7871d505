//! Foundation - Docker services behind a shared reverse proxy
//!
//! This is the main CLI entry point for Foundation.

use anyhow::Context;
use clap::{Parser, Subcommand};
use foundation::deploy::DeployReport;
use foundation::error::FoundationError;
use foundation::preflight::{self, Requirement};
use foundation::service::{CreateRequest, RestartPolicy};
use foundation::{FoundationConfig, ServiceManager, ServiceStatus, Toolchain};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Foundation - Docker services with automatic reverse proxying and TLS
#[derive(Parser)]
#[command(name = "foundation")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(
    about = "A lightweight CLI for managing Docker services with automatic reverse proxying and SSL termination.",
    long_about = None
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the Foundation environment
    Install {
        /// Email address for Let's Encrypt certificate registration
        #[arg(long)]
        default_email: Option<String>,
    },

    /// Create and deploy a new service from a Git repository or Docker image
    Create {
        /// Unique name for the new service
        name: String,
        /// Source Git repository URL or Docker image name
        #[arg(long, visible_aliases = ["repo", "image"])]
        source: String,
        /// Domain where the service will be reachable
        #[arg(long, visible_alias = "host")]
        domain: Option<String>,
        /// Port the container listens on
        #[arg(long)]
        port: Option<u16>,
        /// Let's Encrypt notification email for this service
        #[arg(long)]
        letsencrypt_email: Option<String>,
        /// Environment variable in KEY=VALUE format
        #[arg(short, long)]
        env: Vec<String>,
        /// Volume mapping in NAME:PATH format
        #[arg(short, long)]
        volume: Vec<String>,
        /// Restart policy (no, always, on-failure, unless-stopped)
        #[arg(long, default_value = "unless-stopped")]
        restart: RestartPolicy,
        /// Reserve all GPUs for this service (requires Nvidia drivers)
        #[arg(long)]
        gpu: bool,
    },

    /// Stop and remove a service, deleting its local files
    Delete {
        /// Service name
        name: String,
    },

    /// Start the foundation core and defined services
    Deploy {
        /// Deploy only this service
        name: Option<String>,
    },

    /// Pull git changes and rebuild images
    #[command(hide = true)]
    Update,

    /// List services and their status
    Status,

    /// Print the compose documents as YAML
    Config,
}

impl Commands {
    fn requirement(&self) -> Requirement {
        match self {
            Commands::Install { .. } => Requirement::Nothing,
            Commands::Deploy { .. } => Requirement::Initialized,
            _ => Requirement::Running,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            print_error(&err);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    let config = FoundationConfig::from_env();
    let tools = Toolchain::system(&config);
    let manager = ServiceManager::new(config, tools);

    manager.preflight(command.requirement()).await?;

    match command {
        Commands::Install { default_email } => {
            for missing in preflight::missing_tools().await {
                if let FoundationError::ToolMissing { tool, hint } = &missing {
                    println!("{} is not installed. Install it with: {}", tool, hint);
                    if tool != "railpack" {
                        return Err(missing.into());
                    }
                }
            }

            let report = manager.install(default_email.as_deref()).await?;
            finish(&report)?;
        }

        Commands::Create {
            name,
            source,
            domain,
            port,
            letsencrypt_email,
            env,
            volume,
            restart,
            gpu,
        } => {
            let request = CreateRequest {
                name: name.clone(),
                source,
                domain,
                port,
                tls_email: letsencrypt_email,
                env,
                volumes: volume,
                restart,
                accelerator: gpu,
            };

            let report = manager.create(&request).await?;
            finish(&report)?;
            println!("Service '{}' successfully created.", name);
        }

        Commands::Delete { name } => {
            let report = manager.delete(&name).await?;
            finish(&report)?;
            println!("Service '{}' successfully deleted.", name);
        }

        Commands::Deploy { name } => {
            let report = manager.deploy(name.as_deref()).await?;
            finish(&report)?;
        }

        Commands::Update => {
            let report = manager.update().await?;
            finish(&report)?;
        }

        Commands::Status => {
            let rows = manager.status().await?;
            print_status(&rows);
        }

        Commands::Config => {
            let yaml = manager
                .config_yaml()
                .context("failed to render configuration")?;
            print!("{}", yaml);
        }
    }

    Ok(())
}

/// Print per-service failures and fail if there were any
fn finish(report: &DeployReport) -> anyhow::Result<()> {
    let failures: Vec<&FoundationError> = report.failures().collect();
    if failures.is_empty() {
        return Ok(());
    }

    for failure in &failures {
        println!("Error: {}", failure);
        if let Some(fix) = failure.remediation() {
            println!("  Run `{}`", fix);
        }
    }
    anyhow::bail!("{} step(s) failed", failures.len())
}

fn print_status(rows: &[ServiceStatus]) {
    if rows.is_empty() {
        println!("You have no defined services. Run `foundation create` to create a service.");
        return;
    }

    println!(
        "{:<20} {:<32} {:<12} {:<30}",
        "NAME", "CREATED", "STATUS", "DOMAIN"
    );
    for row in rows {
        println!(
            "{:<20} {:<32} {:<12} {:<30}",
            row.name,
            row.created.as_deref().unwrap_or("Not Created"),
            row.state.as_deref().unwrap_or("Down"),
            row.domain.as_deref().unwrap_or("Not Defined")
        );
    }
    println!("{} defined services", rows.len());
}

fn print_error(err: &anyhow::Error) {
    println!("Error: {:#}", err);
    if let Some(fix) = err
        .downcast_ref::<FoundationError>()
        .and_then(FoundationError::remediation)
    {
        println!("Run `{}` to fix this.", fix);
    }
}
