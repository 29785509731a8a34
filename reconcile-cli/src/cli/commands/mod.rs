//! Command handlers

pub mod import;
pub mod inspect;
pub mod run;

use clap::ValueEnum;
use colored::*;

use reconcile::sync::types::RunCounters;

/// How command results are printed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
    /// Single-line JSON
    JsonCompact,
}

/// Render run counters as one colored line
pub fn format_counters(counters: &RunCounters) -> String {
    format!(
        "found {}, created {}, updated {}, skipped {}, deleted {}, invalid {}",
        counters.found.to_string().bold(),
        counters.created.to_string().green(),
        counters.updated.to_string().cyan(),
        counters.skipped.to_string().dimmed(),
        counters.deleted.to_string().yellow(),
        if counters.invalid > 0 {
            counters.invalid.to_string().red().bold()
        } else {
            counters.invalid.to_string().normal()
        }
    )
}
