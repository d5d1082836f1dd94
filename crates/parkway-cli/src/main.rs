mod banner;
mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parkway_config::{AppConfig, ConfigLoader};
use parkway_db::MigrationRunner;
use parkway_gateway::GatewayServer;
use parkway_gateway::server::{migration_source, open_executor, run_migrations};
use tracing::info;

#[derive(Parser)]
#[command(name = "parkway", version, about = "User service with versioned migrations")]
struct Cli {
    /// Path to config.yml or config.toml
    #[arg(short, long, env = "PARKWAY_CONFIG", default_value = "config/config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending migrations, then serve until SIGINT/SIGTERM (default)
    Serve,
    /// Apply pending migrations and exit
    Migrate,
    /// Show applied and pending migrations
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    logging::init(&config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => migrate(&config),
        Command::Status => status(&config),
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    ConfigLoader::load_or_default(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

async fn serve(config: AppConfig) -> Result<()> {
    info!(
        app = %config.app_name,
        port = config.server.port,
        "configuration loaded"
    );

    let executor = open_executor(&config.database).context("failed to open database")?;
    let report =
        run_migrations(&executor, &config.database).context("failed to run database migrations")?;

    banner::print_banner(&config, report.applied.len() + report.skipped.len());

    GatewayServer::new(config)
        .serve(executor)
        .await
        .context("server terminated with an error")?;

    info!("server exiting");
    Ok(())
}

fn migrate(config: &AppConfig) -> Result<()> {
    let executor = open_executor(&config.database).context("failed to open database")?;
    let report =
        run_migrations(&executor, &config.database).context("failed to run database migrations")?;

    if report.applied.is_empty() {
        println!("Database is up to date.");
    } else {
        for version in &report.applied {
            println!("applied  {version}");
        }
    }
    Ok(())
}

fn status(config: &AppConfig) -> Result<()> {
    let executor = open_executor(&config.database).context("failed to open database")?;
    let runner = MigrationRunner::new(Arc::clone(&executor));
    let source = migration_source(&config.database);

    // `pending` creates the ledger table on a fresh database.
    let pending = runner
        .pending(source.as_ref())
        .context("failed to list pending migrations")?;
    let entries = runner
        .ledger()
        .entries()
        .context("failed to read migration ledger")?;

    for entry in &entries {
        println!(
            "applied  {}  {}",
            entry.version,
            entry.applied_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    for version in &pending {
        println!("pending  {version}");
    }
    if entries.is_empty() && pending.is_empty() {
        println!("No migrations found.");
    }
    Ok(())
}
