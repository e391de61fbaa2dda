//! tidemark CLI
//!
//! `tidemark up` applies pending migrations, `tidemark down` reverts the
//! most recent one, `tidemark status` shows the ledger against the
//! registry. Exits 0 on success, non-zero with the error message otherwise.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

use tidemark::{Config, MigrationLoader, MigrationRunner, store};

#[derive(Parser)]
#[command(name = "tidemark", version, about = "Ledgered schema migrations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ./tidemark.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database URL (overrides config file and environment)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Migrations directory (overrides config file)
    #[arg(long, global = true)]
    migrations_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending migrations
    Up,
    /// Revert the most recently applied migration
    Down,
    /// Show applied and pending migrations
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    if let Err(err) = run(cli).await {
        eprintln!("{} {}", style("error:").red().bold(), err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> tidemark::Result<()> {
    let config = resolve_config(&cli)?;

    let registry = MigrationLoader::new(&config.migrations_dir).load()?;
    let store = store::connect(&config.database_url).await?;
    let runner = MigrationRunner::new(store, registry);

    match cli.command {
        Commands::Up => {
            let result = runner.apply_pending().await?;
            if result.applied.is_empty() {
                println!("{}", style("No pending migrations").green());
            } else {
                println!(
                    "{}",
                    style(format!("Applied {} migration(s)", result.applied.len()))
                        .green()
                        .bold()
                );
                for name in &result.applied {
                    println!("  {}", style(name).dim());
                }
            }
        }
        Commands::Down => {
            let name = runner.revert_last().await?;
            println!("{} {}", style("Reverted").green().bold(), name);
        }
        Commands::Status => {
            let statuses = runner.status().await?;
            if statuses.is_empty() {
                println!("No migrations registered");
            }
            for status in statuses {
                match (status.applied_at, status.known) {
                    (Some(at), true) => println!(
                        "{} {} ({})",
                        style("applied").green(),
                        status.name,
                        at.format("%Y-%m-%d %H:%M:%S")
                    ),
                    (Some(at), false) => println!(
                        "{} {} ({}) {}",
                        style("applied").yellow(),
                        status.name,
                        at.format("%Y-%m-%d %H:%M:%S"),
                        style("not in registry").yellow().bold()
                    ),
                    (None, _) => {
                        println!("{} {}", style("pending").cyan(), status.name)
                    }
                }
            }
        }
    }

    Ok(())
}

fn resolve_config(cli: &Cli) -> tidemark::Result<Config> {
    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        // With no config file in play, a URL on the command line is enough.
        // A file that exists but fails to parse still propagates its error.
        Err(err) => {
            let file_in_play =
                cli.config.is_some() || std::path::Path::new(tidemark::config::CONFIG_FILE).exists();
            match &cli.database_url {
                Some(url) if !file_in_play => Config::new(url.clone()),
                _ => return Err(err),
            }
        }
    };

    if let Some(url) = &cli.database_url {
        config.database_url = url.clone();
    }
    if let Some(dir) = &cli.migrations_dir {
        config.migrations_dir = dir.clone();
    }

    Ok(config)
}
