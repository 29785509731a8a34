//! `import` command: load configuration records from a TOML file
//!
//! ```toml
//! [[sources]]
//! id = "6f1c..."
//! name = "crm"
//! type = "json"
//! location = "https://crm.example.com/api"
//!
//! [[synchronizations]]
//! name = "people"
//! sourceId = "6f1c..."
//! sourceType = "json"
//! targetType = "object-store"
//! targetId = "crm/person"
//! sourceConfig = { endpoint = "/people", resultsPosition = "data" }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::Args;
use colored::*;
use serde::Deserialize;

use reconcile::sync::types::{Mapping, Source, Synchronization};

use crate::cli::Context;

#[derive(Args)]
pub struct ImportArgs {
    /// TOML file with `sources`, `mappings` and `synchronizations` tables
    pub file: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ImportFile {
    pub sources: Vec<Source>,
    pub mappings: Vec<Mapping>,
    pub synchronizations: Vec<Synchronization>,
}

impl ImportFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read import file: {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid import file: {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse import file")
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.mappings.is_empty() && self.synchronizations.is_empty()
    }
}

pub async fn handle_import_command(context: &Context, args: ImportArgs) -> Result<()> {
    let file = ImportFile::from_path(&args.file)?;
    if file.is_empty() {
        anyhow::bail!("Import file contains no records: {}", args.file.display());
    }

    for source in &file.sources {
        context
            .store
            .save_source(source)
            .await
            .with_context(|| format!("Failed to save source '{}'", source.name))?;
        println!("{} source {} {}", "+".green(), source.name.bold(), source.id.to_string().dimmed());
    }

    for mapping in &file.mappings {
        context
            .store
            .save_mapping(mapping)
            .await
            .with_context(|| format!("Failed to save mapping '{}'", mapping.name))?;
        println!("{} mapping {} {}", "+".green(), mapping.name.bold(), mapping.id.to_string().dimmed());
    }

    for synchronization in &file.synchronizations {
        context
            .store
            .save_synchronization(synchronization)
            .await
            .with_context(|| format!("Failed to save synchronization '{}'", synchronization.name))?;
        println!(
            "{} synchronization {} {}",
            "+".green(),
            synchronization.name.bold(),
            synchronization.id.to_string().dimmed()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_import_file() {
        let file = ImportFile::from_toml(
            r#"
            [[sources]]
            id = "1b4e28ba-2fa1-11d2-883f-0016d3cca427"
            name = "crm"
            type = "json"
            location = "https://crm.test"

            [[mappings]]
            name = "person"
            passThrough = true
            unset = ["internal"]
            mapping = { fullName = "name", "address.city" = "city" }

            [[synchronizations]]
            name = "people"
            sourceId = "1b4e28ba-2fa1-11d2-883f-0016d3cca427"
            sourceType = "json"
            targetType = "object-store"
            targetId = "crm/person"
            sourceConfig = { endpoint = "/people", "query.limit" = 50 }
            "#,
        )
        .unwrap();

        assert_eq!(file.sources[0].source_type, "json");
        assert!(file.mappings[0].pass_through);
        assert_eq!(file.mappings[0].mapping.get("address.city").unwrap(), "city");
        assert_eq!(file.synchronizations[0].current_page, 1);
        assert_eq!(file.synchronizations[0].source_config["endpoint"], "/people");
    }

    #[test]
    fn test_empty_file() {
        assert!(ImportFile::from_toml("").unwrap().is_empty());
    }
}
