use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use mysql_grant_reconciler::{
    reconciler::{GrantReconciler, ReconcileReport},
    resource::GrantResource,
    util::sql::build_grant_statements,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mysql-grant-reconciler")]
#[command(about = "Reconciles declared MySQL grants with the privileges held by a server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the ops that would bring the server in line with a grant file
    Plan { resource: PathBuf },
    /// Apply a grant file and verify the result
    Apply { resource: PathBuf },
    /// Read a grant by id, e.g. `jdoe:%:db:*`
    Read { id: String },
    /// Revoke everything a grant file manages
    Destroy { resource: PathBuf },
}

fn load_resource(path: &Path) -> anyhow::Result<GrantResource> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    GrantResource::from_bytes(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_report(report: &ReconcileReport) {
    if report.applied.is_empty() {
        println!("{}: already up to date", report.key);
    }
    for statement in &report.applied {
        println!("{};", statement);
    }
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let reconciler = GrantReconciler::new();
    reconciler.init().await?;

    match cli.command {
        Commands::Plan { resource } => {
            let resource = load_resource(&resource)?;
            let key = resource.key()?;
            let ops = reconciler.plan(&resource).await?;
            if ops.is_empty() {
                println!("{}: already up to date", key);
            }
            for op in ops {
                println!("# {}", op.friendly_message(&key));
                println!("{}", op.to_json()?);
            }
        }
        Commands::Apply { resource } => {
            let resource = load_resource(&resource)?;
            let report = reconciler.reconcile(&resource).await?;
            print_report(&report);
        }
        Commands::Read { id } => match reconciler.read(&id).await? {
            Some(grant) => {
                for statement in build_grant_statements(&grant) {
                    println!("{};", statement);
                }
            }
            None => println!("{}: no grants", id),
        },
        Commands::Destroy { resource } => {
            let resource = load_resource(&resource)?;
            let report = reconciler.destroy(&resource).await?;
            print_report(&report);
        }
    }

    Ok(())
}
