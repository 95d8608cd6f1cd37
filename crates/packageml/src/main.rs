//! `PackageML` command line
//!
//! Manages datasets, model configurations and training jobs stored in
//! `PostgreSQL`, and runs the jobs it starts in-process.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use database::{create_pool, run_migrations, PgStore};
use ml_model::BurnBackend;
use orchestrator::Services;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod commands;

use commands::{DatasetCommand, JobCommand, ModelCommand};

/// `PackageML` dataset, model and training job manager
#[derive(Parser)]
#[command(name = "packageml")]
#[command(about = "Manage tabular datasets, model configurations and training jobs")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Acting user; every record read or written is scoped to it
    #[arg(short, long, global = true, env = "PACKAGEML_USER")]
    user: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage datasets
    #[command(subcommand)]
    Dataset(DatasetCommand),

    /// Manage model configurations
    #[command(subcommand)]
    Model(ModelCommand),

    /// Manage training jobs
    #[command(subcommand)]
    Job(JobCommand),

    /// Run database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    let pool = create_pool(&config.database_url, config.max_connections).await?;

    if let Commands::Migrate = cli.command {
        run_migrations(&pool).await?;
        info!("Migrations completed successfully");
        return Ok(());
    }

    let owner = cli
        .user
        .context("no acting user: pass --user or set PACKAGEML_USER")?;

    let store = Arc::new(PgStore::new(pool));
    let services = Services::new(
        store,
        Arc::new(BurnBackend::new()),
        config.max_concurrent_jobs,
    );

    match cli.command {
        Commands::Dataset(command) => commands::datasets::run(&services, owner, command).await?,
        Commands::Model(command) => commands::models::run(&services, owner, command).await?,
        Commands::Job(command) => commands::jobs::run(&services, owner, command).await?,
        Commands::Migrate => {}
    }

    Ok(())
}
