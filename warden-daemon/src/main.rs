use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use warden_daemon::deps;
use warden_daemon::descriptor::{Registry, ServiceDescriptor};
use warden_daemon::errors::DaemonError;
use warden_daemon::supervisor::Supervisor;

/// Warden - a dependency-ordered service supervisor for a single host
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the service descriptor file
    #[arg(short = 'f', long = "file")]
    file: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start all services, supervise until interrupted, then stop them
    Run,
    /// Print the computed start order without starting anything
    Plan,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("Failed to read descriptor file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse descriptor file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "SERVICE")]
    name: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "PID")]
    pid: String,
    #[tabled(rename = "DETAIL")]
    detail: String,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let descriptors = load_descriptors(&cli.file)?;
    let mut registry = Registry::new();
    registry.register_all(descriptors)?;

    match cli.command {
        Commands::Plan => {
            let plan = deps::plan(&registry)?;
            for (i, name) in plan.order.iter().enumerate() {
                println!("{:>3}. {}", i + 1, name);
            }
            for skip in &plan.skipped {
                println!("  -  {} (skipped: {})", skip.service, skip.reason);
            }
            Ok(())
        }
        Commands::Run => {
            let mut supervisor = Supervisor::new(registry);

            let report = supervisor.start_all().await?;
            for (name, error) in &report.failed {
                eprintln!("{}: {}", name, error);
            }
            print_status(&supervisor);

            tokio::signal::ctrl_c()
                .await
                .map_err(|e| DaemonError::Internal(format!("waiting for ctrl-c: {}", e)))?;

            let stop = supervisor.stop_all().await;
            for (name, error) in &stop.failed {
                eprintln!("{}: {}", name, error);
            }
            print_status(&supervisor);
            Ok(())
        }
    }
}

fn load_descriptors(path: &PathBuf) -> Result<Vec<ServiceDescriptor>, CliError> {
    let raw = std::fs::read_to_string(path).map_err(|e| CliError::Read {
        path: path.clone(),
        source: e,
    })?;
    serde_yaml::from_str(&raw).map_err(|e| CliError::Parse {
        path: path.clone(),
        source: e,
    })
}

fn print_status(supervisor: &Supervisor) {
    let rows: Vec<StatusRow> = supervisor
        .status()
        .into_iter()
        .map(|info| StatusRow {
            name: info.name,
            status: info.status.to_string(),
            pid: info.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            detail: info.last_error.unwrap_or_default(),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::blank());
    println!("{}", table);
}
