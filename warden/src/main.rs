use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use warden_core::{
    EventBus, SystemClock, WardenConfig,
    repositories::{LockoutRepositoryAdapter, RepositoryProvider},
    services::LockoutService,
    storage::LockoutStatus,
};
use warden_storage_sqlite::SqliteRepositoryProvider;

/// Command line interface for Warden
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(long, env = "WARDEN_DATABASE_URL", global = true)]
    db_url: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(clap::Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Show whether an identifier is locked, and its lockout history
    Status {
        identifier: String,
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Release every active lockout of an identifier
    Unlock {
        identifier: String,
        /// Who is unlocking, recorded on the lockout
        #[arg(long)]
        by: String,
    },
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::Version = cli.command {
        println!("Warden v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let db_url = cli
        .db_url
        .as_deref()
        .ok_or("--db-url or WARDEN_DATABASE_URL is required")?;
    let repositories = Arc::new(SqliteRepositoryProvider::connect(db_url).await?);
    let config = WardenConfig::from_env()?;
    let lockouts = LockoutService::new(
        Arc::new(LockoutRepositoryAdapter::new(repositories.clone())),
        config.lockout,
        Arc::new(SystemClock),
        EventBus::new(),
    );

    match cli.command {
        Commands::Migrate => {
            println!("Running migrations...");
            repositories.migrate().await?;
            println!("Done.");
        }
        Commands::Status { identifier, json } => {
            let status = lockouts.is_locked(&identifier).await?;
            let history = lockouts.list_lockouts(&identifier).await?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "status": status, "lockouts": history })
                );
            } else {
                print_status(&status);
                for lockout in &history {
                    let state = if lockout.is_active(Utc::now()) {
                        "active".to_string()
                    } else if let Some(by) = &lockout.unlocked_by {
                        format!("unlocked by {by}")
                    } else {
                        "expired".to_string()
                    };
                    println!(
                        "  {}  {} failures  until {}  ({state})",
                        lockout.created_at.format("%Y-%m-%d %H:%M:%S"),
                        lockout.failed_attempts,
                        lockout.unlock_at.format("%Y-%m-%d %H:%M:%S"),
                    );
                }
            }
        }
        Commands::Unlock { identifier, by } => {
            let released = lockouts.manual_unlock(&identifier, &by).await?;
            if released == 0 {
                println!("{identifier} was not locked");
            } else {
                println!("Released {released} lockout(s) for {identifier}");
            }
        }
        Commands::Version => {}
    }

    Ok(())
}

fn print_status(status: &LockoutStatus) {
    match (status.locked, status.unlock_at) {
        (true, Some(until)) => println!(
            "{} is locked until {} UTC",
            status.identifier,
            until.format("%Y-%m-%d %H:%M:%S")
        ),
        _ => println!("{} is not locked", status.identifier),
    }
}
