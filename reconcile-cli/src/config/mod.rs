//! Application settings and persistence
//!
//! Settings come from a TOML file (default `~/.config/reconcile/config.toml`),
//! then `RECONCILE_*` environment variables override individual keys.

pub mod repository;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::sync::EngineSettings;

pub const ENV_DATABASE_URL: &str = "RECONCILE_DATABASE_URL";
pub const ENV_LOG_LEVEL: &str = "RECONCILE_LOG_LEVEL";

/// Settings for the CLI and the engine it drives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    pub log_level: String,
    /// Days run and contract logs are kept before `prune` removes them
    pub log_retention_days: i64,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    /// Write to targets even in test mode
    pub write_targets_in_test: bool,
    /// Query parameter used by page-numbered pagination
    pub page_parameter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            log_level: "info".to_string(),
            log_retention_days: 7,
            http_timeout_secs: 30,
            user_agent: format!("reconcile-cli/{}", env!("CARGO_PKG_VERSION")),
            write_targets_in_test: false,
            page_parameter: "page".to_string(),
        }
    }
}

fn default_database_url() -> String {
    let path = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reconcile")
        .join("reconcile.db");
    format!("sqlite://{}", path.display())
}

/// Default location of the settings file
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reconcile")
        .join("config.toml")
}

impl Settings {
    /// Create a new builder starting from the defaults
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Load from `path` (or the default location), then apply environment overrides
    ///
    /// A missing file at the default location is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    debug!("No config file at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };

        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse settings")
    }

    /// Apply `RECONCILE_*` overrides through the given lookup
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.is_empty()) {
            self.database_url = url;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
            self.log_level = level;
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Create the directory holding a file-backed database
    pub fn ensure_database_dir(&self) -> Result<()> {
        let path = self
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"));

        if let Some(path) = path.filter(|p| !p.contains(":memory:")) {
            let path = path.split('?').next().unwrap_or(path);
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            log_retention_days: self.log_retention_days,
            write_targets_in_test: self.write_targets_in_test,
            page_parameter: self.page_parameter.clone(),
        }
    }
}

/// Builder for Settings
#[derive(Debug)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
        }
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.settings.database_url = url.into();
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.settings.log_level = level.into();
        self
    }

    pub fn log_retention_days(mut self, days: i64) -> Self {
        self.settings.log_retention_days = days;
        self
    }

    pub fn http_timeout_secs(mut self, secs: u64) -> Self {
        self.settings.http_timeout_secs = secs;
        self
    }

    pub fn write_targets_in_test(mut self, enabled: bool) -> Self {
        self.settings.write_targets_in_test = enabled;
        self
    }

    pub fn page_parameter(mut self, name: impl Into<String>) -> Self {
        self.settings.page_parameter = name.into();
        self
    }

    /// Build the final settings
    pub fn build(self) -> Settings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.log_retention_days, 7);
        assert_eq!(settings.http_timeout(), Duration::from_secs(30));
        assert_eq!(settings.page_parameter, "page");
        assert!(!settings.write_targets_in_test);
        assert!(settings.database_url.starts_with("sqlite://"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml(
            r#"
            database_url = "sqlite::memory:"
            page_parameter = "p"
            "#,
        )
        .unwrap();
        assert_eq!(settings.database_url, "sqlite::memory:");
        assert_eq!(settings.page_parameter, "p");
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_env_overrides() {
        let env = HashMap::from([
            (ENV_DATABASE_URL, "sqlite:///tmp/x.db".to_string()),
            (ENV_LOG_LEVEL, "debug".to_string()),
        ]);
        let mut settings = Settings::default();
        settings.apply_env(|key| env.get(key).cloned());
        assert_eq!(settings.database_url, "sqlite:///tmp/x.db");
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_builder() {
        let settings = Settings::builder()
            .database_url("sqlite::memory:")
            .log_retention_days(1)
            .write_targets_in_test(true)
            .build();
        assert_eq!(settings.log_retention_days, 1);
        assert!(settings.engine_settings().write_targets_in_test);
    }

    #[test]
    fn test_from_file_and_database_dir() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("reconcile.db");
        let config = dir.path().join("config.toml");
        std::fs::write(
            &config,
            format!("database_url = \"sqlite://{}\"\n", db.display()),
        )
        .unwrap();

        let settings = Settings::from_file(&config).unwrap();
        settings.ensure_database_dir().unwrap();
        assert!(dir.path().join("nested").is_dir());
    }
}
