//! dbsql-migrate
//!
//! Apply or inspect schema migrations for any registered provider.
//!
//! # Commands
//!
//! - `up` - Apply pending migrations
//! - `status` - Print the recorded schema version

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dbsql::prelude::*;
use dbsql::{MigrateOutcome, MigrationDriver as _, run_migrations};
use tracing_subscriber::EnvFilter;

/// Schema migration tool for dbsql databases.
#[derive(Parser)]
#[command(name = "dbsql-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Provider name (postgres, sqlite)
    #[arg(global = true, short, long, default_value = "postgres")]
    provider: String,

    /// Connection URL; overrides the one in --config
    #[arg(global = true, short, long)]
    url: Option<String>,

    /// Migrations root; the provider's sub-directory is appended
    #[arg(global = true, short, long)]
    migrations: Option<PathBuf>,

    /// JSON file holding the database configuration section
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `dbsql=debug`
    #[arg(global = true, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Up,

    /// Print the recorded schema version
    Status,
}

fn load_config(cli: &Cli) -> Result<DbConfig, DbError> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path).map_err(|e| {
                DbError::ConfigInvalid(format!("read {}: {e}", path.display()))
            })?;
            DbConfig::from_json(&json)?
        }
        None => DbConfig::default(),
    };
    if let Some(url) = &cli.url {
        config.url = Some(url.clone());
    }
    if let Some(dir) = &cli.migrations {
        config.migrations.directory.clone_from(dir);
    }
    // The tool is single-shot: one connection is enough.
    config.max_connections = 1;
    config.max_idle_connections = 1;
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), DbError> {
    let provider = ProviderRegistry::with_builtin().get(&cli.provider)?;
    let config = load_config(&cli)?;

    let pool = provider
        .open(config.require_url()?)?
        .connect_pool(&config.pool_options())
        .await?;

    match cli.command {
        Commands::Up => {
            match run_migrations(provider.as_ref(), &pool, &config.migrations.directory).await? {
                MigrateOutcome::NoChange => println!("no change"),
                MigrateOutcome::Applied { from, to } => match from {
                    Some(from) => println!("migrated {from} -> {to}"),
                    None => println!("migrated to {to}"),
                },
            }
        }
        Commands::Status => {
            let mut driver = provider.migration_driver(pool.get().await?)?;
            match driver.version().await? {
                Some(v) if v.dirty => println!("version {} (dirty)", v.version),
                Some(v) => println!("version {}", v.version),
                None => println!("no migrations applied"),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "dbsql-migrate failed");
        return Err(e.into());
    }
    Ok(())
}
