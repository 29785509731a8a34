//! Read-only commands plus log pruning

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use colored::*;
use uuid::Uuid;

use reconcile::sync::types::ContractLogResult;

use super::{OutputFormat, format_counters};
use crate::cli::Context;

#[derive(Args)]
pub struct FetchArgs {
    /// Source id
    pub source: Uuid,

    /// Endpoint relative to the source location
    pub endpoint: String,

    /// Write the object to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct LogsArgs {
    /// Synchronization id
    pub id: Uuid,

    /// Number of runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: u32,

    /// Also list the per-object results of each run
    #[arg(long)]
    pub details: bool,
}

pub async fn handle_list_command(context: &Context) -> Result<()> {
    let synchronizations = context
        .store
        .list_synchronizations()
        .await
        .context("Failed to list synchronizations")?;

    if synchronizations.is_empty() {
        println!("{}", "No synchronizations configured".dimmed());
        return Ok(());
    }

    for sync in synchronizations {
        println!(
            "{}  {}  {} {} {} {}",
            sync.id.to_string().dimmed(),
            sync.name.bold(),
            sync.source_type.cyan(),
            "→".dimmed(),
            sync.target_type.cyan(),
            sync.target_id
        );
        if sync.current_page > 1 {
            println!("    {} page {}", "resumes at".yellow(), sync.current_page);
        }
    }
    Ok(())
}

pub async fn handle_fetch_command(context: &Context, args: FetchArgs) -> Result<()> {
    let object = context
        .engine
        .fetch_object(args.source, &args.endpoint)
        .await
        .with_context(|| format!("Failed to fetch {}", args.endpoint))?;

    let formatted = match args.format {
        OutputFormat::JsonCompact => serde_json::to_string(&object)?,
        OutputFormat::Json | OutputFormat::Text => serde_json::to_string_pretty(&object)?,
    };

    match args.output {
        Some(path) => {
            std::fs::write(&path, &formatted)
                .with_context(|| format!("Failed to write output to: {}", path.display()))?;
            println!("Saved to {}", path.display().to_string().bright_green());
        }
        None => println!("{}", formatted),
    }
    Ok(())
}

pub async fn handle_logs_command(context: &Context, args: LogsArgs) -> Result<()> {
    let logs = context
        .store
        .list_run_logs(args.id, args.limit)
        .await
        .context("Failed to load run logs")?;

    if logs.is_empty() {
        println!("{}", "No runs recorded".dimmed());
        return Ok(());
    }

    for log in logs {
        let status = if log.is_success() {
            "ok".green().bold()
        } else {
            "failed".red().bold()
        };
        let flags = match (log.test, log.force) {
            (true, true) => " test force",
            (true, false) => " test",
            (false, true) => " force",
            (false, false) => "",
        };
        println!(
            "{} {}{} {}ms",
            log.created.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            status,
            flags.yellow(),
            log.execution_time_ms
        );
        println!("  {}", format_counters(&log.counters));
        if !log.is_success() {
            if let Some(message) = &log.message {
                println!("  {}", message.red());
            }
        }

        if args.details {
            for entry in context.store.list_contract_logs(log.id).await? {
                let result = match entry.target_result {
                    ContractLogResult::Created => "created".green(),
                    ContractLogResult::Updated => "updated".cyan(),
                    ContractLogResult::Skipped => "skipped".dimmed(),
                    ContractLogResult::Deleted => "deleted".yellow(),
                    ContractLogResult::Invalid => "invalid".red(),
                };
                println!(
                    "    {:<8} {} {} {}",
                    result,
                    entry.origin_id.as_deref().unwrap_or("-"),
                    "→".dimmed(),
                    entry.target_id.as_deref().unwrap_or("-")
                );
                if let Some(error) = entry.error {
                    println!("             {}", error.red());
                }
            }
        }
    }
    Ok(())
}

pub async fn handle_prune_command(context: &Context) -> Result<()> {
    let removed = context
        .engine
        .prune_logs()
        .await
        .context("Failed to prune logs")?;
    println!(
        "Removed {} expired log record(s) from {}",
        removed.to_string().bold(),
        context.settings.database_url.dimmed()
    );
    Ok(())
}
