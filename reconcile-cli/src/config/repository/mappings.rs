//! Mappings repository

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_json, parse_uuid};
use crate::sync::types::Mapping;

/// Get a mapping by id
pub async fn get_mapping(pool: &SqlitePool, id: Uuid) -> Result<Option<Mapping>> {
    let row = sqlx::query("SELECT id, name, mapping, unset, pass_through FROM mappings WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get mapping")?;

    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    let id: String = row.try_get("id")?;
    let mapping: String = row.try_get("mapping")?;
    let unset: String = row.try_get("unset")?;

    Ok(Some(Mapping {
        id: parse_uuid(&id)?,
        name: row.try_get("name")?,
        mapping: parse_json(&mapping, "mapping")?,
        unset: parse_json(&unset, "unset")?,
        pass_through: row.try_get::<i64, _>("pass_through")? != 0,
    }))
}

/// Insert or replace a mapping
pub async fn save_mapping(pool: &SqlitePool, mapping: &Mapping) -> Result<()> {
    let fields = serde_json::to_string(&mapping.mapping).context("Failed to serialize mapping")?;
    let unset = serde_json::to_string(&mapping.unset).context("Failed to serialize unset")?;

    sqlx::query(
        "INSERT INTO mappings (id, name, mapping, unset, pass_through)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            mapping = excluded.mapping,
            unset = excluded.unset,
            pass_through = excluded.pass_through",
    )
    .bind(mapping.id.to_string())
    .bind(&mapping.name)
    .bind(fields)
    .bind(unset)
    .bind(mapping.pass_through as i64)
    .execute(pool)
    .await
    .context("Failed to save mapping")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::repository::connect;

    #[tokio::test]
    async fn test_save_and_get_mapping() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let mapping = Mapping::new("people")
            .field("fullName", "name")
            .field("kind", "=person")
            .unset("secret")
            .pass_through(true);

        save_mapping(&pool, &mapping).await.unwrap();
        let loaded = get_mapping(&pool, mapping.id).await.unwrap().unwrap();
        assert_eq!(loaded, mapping);
    }
}
