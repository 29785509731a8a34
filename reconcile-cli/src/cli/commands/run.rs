//! `run` command

use anyhow::{Context as _, Result};
use clap::Args;
use colored::*;
use uuid::Uuid;

use reconcile::sync::RunOptions;

use super::{OutputFormat, format_counters};
use crate::cli::Context;

#[derive(Args)]
pub struct RunArgs {
    /// Synchronization id
    pub id: Uuid,

    /// Dry run: only the first source object, nothing written or deleted
    #[arg(long)]
    pub test: bool,

    /// Write objects even when their content did not change
    #[arg(long)]
    pub force: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

pub async fn handle_run_command(context: &Context, args: RunArgs) -> Result<()> {
    let options = RunOptions {
        test: args.test,
        force: args.force,
    };

    let result = context.engine.synchronize(args.id, options).await;

    let log = match result {
        Ok(log) => log,
        Err(e) => {
            if let Some(headers) = e.rate_limit_headers() {
                for (name, value) in headers {
                    eprintln!("  {}: {}", name.dimmed(), value);
                }
            }
            return Err(e).with_context(|| format!("Synchronization {} failed", args.id));
        }
    };

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&log)?),
        OutputFormat::JsonCompact => println!("{}", serde_json::to_string(&log)?),
        OutputFormat::Text => {
            let mode = match (args.test, args.force) {
                (true, true) => " (test, force)",
                (true, false) => " (test)",
                (false, true) => " (force)",
                (false, false) => "",
            };
            println!(
                "{} {}{} in {}ms",
                "✓".green().bold(),
                args.id.to_string().bright_white(),
                mode.dimmed(),
                log.execution_time_ms
            );
            println!("  {}", format_counters(&log.counters));
            println!("  run log {}", log.id.to_string().dimmed());
        }
    }

    Ok(())
}
