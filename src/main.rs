use clap::{Parser, Subcommand};
use mongo_migrator::config::{MongoSettings, RunnerSettings};
use mongo_migrator::migration::{create_registry, MigrationExecutor, MigrationStatus};
use mongo_migrator::store::{MongoStore, SchemaStore};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Mongo Migrator - Applies versioned schema migrations to a MongoDB database
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    mongo: MongoSettings,

    #[command(flatten)]
    runner: RunnerSettings,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply all pending migrations (default)
    Up,
    /// Show applied and pending migrations
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; real environment variables still apply
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout is reserved for command output such as `status --json`
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    args.mongo.validate()?;
    args.runner.validate()?;

    info!(target_db = %args.mongo.redacted(), "Connecting to MongoDB");
    let store: Arc<dyn SchemaStore> = Arc::new(MongoStore::connect(&args.mongo).await?);
    let executor = MigrationExecutor::new(store, create_registry(), args.runner);

    match args.command.unwrap_or(Command::Up) {
        Command::Up => {
            let report = executor.run().await?;
            info!(
                total = report.total,
                applied_before = report.applied_before,
                applied_now = report.applied.len(),
                "Migration finished"
            );
        }
        Command::Status { json } => {
            let status = executor.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}

fn print_status(status: &MigrationStatus) {
    for entry in &status.entries {
        match entry.applied_at {
            Some(at) => println!("applied  {}  {}", entry.identifier, at.to_rfc3339()),
            None => println!("pending  {}", entry.identifier),
        }
    }
    println!(
        "{} applied, {} pending",
        status.applied().count(),
        status.pending().count()
    );
}
