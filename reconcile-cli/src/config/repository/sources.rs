//! Sources repository

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_json, parse_uuid};
use crate::api::rate_limit::RateLimitState;
use crate::sync::types::Source;

const SELECT_SOURCE: &str = "SELECT id, name, source_type, location, config,
        rate_limit_limit, rate_limit_remaining, rate_limit_reset, rate_limit_window,
        created, updated
 FROM sources";

fn source_from_row(row: &SqliteRow) -> Result<Source> {
    let id: String = row.try_get("id")?;
    let config: String = row.try_get("config")?;

    Ok(Source {
        id: parse_uuid(&id)?,
        name: row.try_get("name")?,
        source_type: row.try_get("source_type")?,
        location: row.try_get("location")?,
        config: parse_json(&config, "config")?,
        rate_limit: RateLimitState {
            limit: row.try_get("rate_limit_limit")?,
            remaining: row.try_get("rate_limit_remaining")?,
            reset: row.try_get("rate_limit_reset")?,
            window: row.try_get("rate_limit_window")?,
        },
        created: row.try_get("created")?,
        updated: row.try_get("updated")?,
    })
}

/// Get a source by id
pub async fn get_source(pool: &SqlitePool, id: Uuid) -> Result<Option<Source>> {
    let row = sqlx::query(&format!("{SELECT_SOURCE} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get source")?;

    row.as_ref().map(source_from_row).transpose()
}

/// List all sources ordered by name
pub async fn list_sources(pool: &SqlitePool) -> Result<Vec<Source>> {
    let rows = sqlx::query(&format!("{SELECT_SOURCE} ORDER BY name"))
        .fetch_all(pool)
        .await
        .context("Failed to list sources")?;

    rows.iter().map(source_from_row).collect()
}

/// Insert or replace a source, including its rate-limit state
pub async fn save_source(pool: &SqlitePool, source: &Source) -> Result<()> {
    let config = serde_json::to_string(&source.config).context("Failed to serialize config")?;

    sqlx::query(
        "INSERT INTO sources (id, name, source_type, location, config,
            rate_limit_limit, rate_limit_remaining, rate_limit_reset, rate_limit_window,
            created, updated)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            source_type = excluded.source_type,
            location = excluded.location,
            config = excluded.config,
            rate_limit_limit = excluded.rate_limit_limit,
            rate_limit_remaining = excluded.rate_limit_remaining,
            rate_limit_reset = excluded.rate_limit_reset,
            rate_limit_window = excluded.rate_limit_window,
            updated = excluded.updated",
    )
    .bind(source.id.to_string())
    .bind(&source.name)
    .bind(&source.source_type)
    .bind(&source.location)
    .bind(config)
    .bind(source.rate_limit.limit)
    .bind(source.rate_limit.remaining)
    .bind(source.rate_limit.reset)
    .bind(source.rate_limit.window)
    .bind(source.created)
    .bind(source.updated)
    .execute(pool)
    .await
    .context("Failed to save source")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::repository::connect;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_and_get_source_with_rate_limit() {
        let pool = connect("sqlite::memory:").await.unwrap();

        let mut source = Source::new("crm", "json", "https://crm.test");
        source.config = json!({"headers": {"X-Key": "abc"}});
        source.rate_limit.remaining = Some(3);
        save_source(&pool, &source).await.unwrap();

        source.rate_limit.remaining = Some(2);
        save_source(&pool, &source).await.unwrap();

        let loaded = get_source(&pool, source.id).await.unwrap().unwrap();
        assert_eq!(loaded.config, source.config);
        assert_eq!(loaded.rate_limit.remaining, Some(2));
        assert_eq!(list_sources(&pool).await.unwrap().len(), 1);
        assert!(get_source(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }
}
