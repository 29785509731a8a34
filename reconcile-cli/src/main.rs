//! reconcile-cli - run and inspect source-to-target synchronizations

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;

use reconcile::config::Settings;

mod cli;

/// Synchronize objects from source systems into target systems
#[derive(Parser)]
#[command(name = "reconcile-cli")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synchronization
    Run(cli::commands::run::RunArgs),

    /// List configured synchronizations
    List,

    /// Import sources, mappings and synchronizations from a TOML file
    Import(cli::commands::import::ImportArgs),

    /// Fetch a single object from a source
    Fetch(cli::commands::inspect::FetchArgs),

    /// Show recent run logs of a synchronization
    Logs(cli::commands::inspect::LogsArgs),

    /// Remove expired run and contract logs
    Prune,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.log_level.as_str()),
    )
    .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let context = cli::Context::open(settings).await?;

    match cli.command {
        Commands::Run(args) => cli::commands::run::handle_run_command(&context, args).await,
        Commands::List => cli::commands::inspect::handle_list_command(&context).await,
        Commands::Import(args) => {
            cli::commands::import::handle_import_command(&context, args).await
        }
        Commands::Fetch(args) => cli::commands::inspect::handle_fetch_command(&context, args).await,
        Commands::Logs(args) => cli::commands::inspect::handle_logs_command(&context, args).await,
        Commands::Prune => cli::commands::inspect::handle_prune_command(&context).await,
    }
}
