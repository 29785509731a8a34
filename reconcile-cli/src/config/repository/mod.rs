//! Repository layer for database operations
//!
//! Free functions over a `SqlitePool`, one module per table. Identifiers are
//! stored as text and JSON columns as serialized strings.

pub mod contracts;
pub mod logs;
pub mod mappings;
pub mod migrations;
pub mod objects;
pub mod sources;
pub mod synchronizations;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use uuid::Uuid;

pub use migrations::connect;

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid UUID in database: {raw}"))
}

pub(crate) fn parse_optional_uuid(raw: Option<String>) -> Result<Option<Uuid>> {
    raw.as_deref().map(parse_uuid).transpose()
}

pub(crate) fn parse_json<T: DeserializeOwned>(raw: &str, column: &str) -> Result<T> {
    serde_json::from_str(raw).with_context(|| format!("Failed to parse {column} column"))
}
