//! Synchronizations repository

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_json, parse_optional_uuid, parse_uuid};
use crate::sync::types::Synchronization;

const SELECT_SYNCHRONIZATION: &str = "SELECT id, name, source_id, source_type, source_config,
        target_id, target_type, target_config, mapping_id, conditions, follow_ups,
        current_page, created, updated
 FROM synchronizations";

fn synchronization_from_row(row: &SqliteRow) -> Result<Synchronization> {
    let id: String = row.try_get("id")?;
    let source_id: String = row.try_get("source_id")?;
    let source_config: String = row.try_get("source_config")?;
    let target_config: String = row.try_get("target_config")?;
    let conditions: Option<String> = row.try_get("conditions")?;
    let follow_ups: String = row.try_get("follow_ups")?;

    Ok(Synchronization {
        id: parse_uuid(&id)?,
        name: row.try_get("name")?,
        source_id: parse_uuid(&source_id)?,
        source_type: row.try_get("source_type")?,
        source_config: parse_json(&source_config, "source_config")?,
        target_id: row.try_get("target_id")?,
        target_type: row.try_get("target_type")?,
        target_config: parse_json(&target_config, "target_config")?,
        mapping_id: parse_optional_uuid(row.try_get("mapping_id")?)?,
        conditions: conditions
            .as_deref()
            .map(|raw| parse_json(raw, "conditions"))
            .transpose()?,
        follow_ups: parse_json(&follow_ups, "follow_ups")?,
        current_page: row.try_get::<i64, _>("current_page")?.max(1) as u32,
        created: row.try_get("created")?,
        updated: row.try_get("updated")?,
    })
}

/// Get a synchronization by id
pub async fn get_synchronization(pool: &SqlitePool, id: Uuid) -> Result<Option<Synchronization>> {
    let row = sqlx::query(&format!("{SELECT_SYNCHRONIZATION} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get synchronization")?;

    row.as_ref().map(synchronization_from_row).transpose()
}

/// List all synchronizations ordered by name
pub async fn list_synchronizations(pool: &SqlitePool) -> Result<Vec<Synchronization>> {
    let rows = sqlx::query(&format!("{SELECT_SYNCHRONIZATION} ORDER BY name"))
        .fetch_all(pool)
        .await
        .context("Failed to list synchronizations")?;

    rows.iter().map(synchronization_from_row).collect()
}

/// Insert or replace a synchronization
pub async fn save_synchronization(pool: &SqlitePool, sync: &Synchronization) -> Result<()> {
    let source_config =
        serde_json::to_string(&sync.source_config).context("Failed to serialize source config")?;
    let target_config =
        serde_json::to_string(&sync.target_config).context("Failed to serialize target config")?;
    let conditions = sync
        .conditions
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to serialize conditions")?;
    let follow_ups =
        serde_json::to_string(&sync.follow_ups).context("Failed to serialize follow-ups")?;

    sqlx::query(
        "INSERT INTO synchronizations (id, name, source_id, source_type, source_config,
            target_id, target_type, target_config, mapping_id, conditions, follow_ups,
            current_page, created, updated)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            source_id = excluded.source_id,
            source_type = excluded.source_type,
            source_config = excluded.source_config,
            target_id = excluded.target_id,
            target_type = excluded.target_type,
            target_config = excluded.target_config,
            mapping_id = excluded.mapping_id,
            conditions = excluded.conditions,
            follow_ups = excluded.follow_ups,
            current_page = excluded.current_page,
            updated = excluded.updated",
    )
    .bind(sync.id.to_string())
    .bind(&sync.name)
    .bind(sync.source_id.to_string())
    .bind(&sync.source_type)
    .bind(source_config)
    .bind(&sync.target_id)
    .bind(&sync.target_type)
    .bind(target_config)
    .bind(sync.mapping_id.map(|id| id.to_string()))
    .bind(conditions)
    .bind(follow_ups)
    .bind(sync.current_page as i64)
    .bind(sync.created)
    .bind(sync.updated)
    .execute(pool)
    .await
    .context("Failed to save synchronization")?;

    Ok(())
}

/// Move the page cursor of a synchronization
pub async fn set_current_page(pool: &SqlitePool, id: Uuid, page: u32) -> Result<()> {
    sqlx::query("UPDATE synchronizations SET current_page = ?, updated = ? WHERE id = ?")
        .bind(page as i64)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(pool)
        .await
        .context("Failed to update page cursor")?;

    Ok(())
}
