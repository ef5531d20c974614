use std::path::PathBuf;
use std::time::Duration;

use aerodata_core::{db, ingest, IngestOptions, TargetTable};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Aerobiology data ingestion CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a file and upsert it into its target table
    Ingest(IngestArgs),
    /// Run database migrations
    Migrate,
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Delimited, spreadsheet or JSON file to ingest
    path: PathBuf,
    /// Target table name; skips classification
    #[arg(long)]
    table: Option<String>,
    /// Abort the ingestion after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Ingest(args) => {
            let mut options = IngestOptions::default();
            if let Some(name) = args.table.as_deref() {
                let table: TargetTable = name.parse()?;
                options = options.with_table(table);
            }
            if let Some(secs) = args.deadline_secs {
                options = options.with_deadline(Duration::from_secs(secs));
            }

            let pool = connect_pool().await?;
            let report = ingest(&pool, &args.path, options)
                .await
                .with_context(|| format!("failed to ingest {}", args.path.display()))?;
            info!("{}", report.summary());
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Migrate => {
            let pool = connect_pool().await?;
            db::run_migrations(&pool).await?;
            info!("Database migrations applied");
            Ok(())
        }
    }
}

async fn connect_pool() -> Result<db::DbPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .or_else(|_| std::env::var("AERODATA_DATABASE_URL"))
        .context("DATABASE_URL (or AERODATA_DATABASE_URL) must be set")?;
    db::connect(&database_url).await
}
