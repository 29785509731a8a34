//! Internal object store repository

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use super::parse_json;

/// Get one stored object
pub async fn get_object(
    pool: &SqlitePool,
    collection: &str,
    kind: &str,
    id: &str,
) -> Result<Option<Value>> {
    let row = sqlx::query("SELECT data FROM objects WHERE collection = ? AND kind = ? AND id = ?")
        .bind(collection)
        .bind(kind)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get object")?;

    match row {
        Some(row) => {
            let data: String = row.try_get("data")?;
            Ok(Some(parse_json(&data, "data")?))
        }
        None => Ok(None),
    }
}

/// All objects of a collection/kind, ordered by id
pub async fn list_objects(pool: &SqlitePool, collection: &str, kind: &str) -> Result<Vec<Value>> {
    let rows = sqlx::query("SELECT data FROM objects WHERE collection = ? AND kind = ? ORDER BY id")
        .bind(collection)
        .bind(kind)
        .fetch_all(pool)
        .await
        .context("Failed to list objects")?;

    rows.iter()
        .map(|row| {
            let data: String = row.try_get("data")?;
            parse_json(&data, "data")
        })
        .collect()
}

/// Insert or replace an object
pub async fn upsert_object(
    pool: &SqlitePool,
    collection: &str,
    kind: &str,
    id: &str,
    data: &Value,
) -> Result<()> {
    let now = Utc::now();
    let data = serde_json::to_string(data).context("Failed to serialize object")?;

    sqlx::query(
        "INSERT INTO objects (collection, kind, id, data, created, updated)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(collection, kind, id) DO UPDATE SET
            data = excluded.data,
            updated = excluded.updated",
    )
    .bind(collection)
    .bind(kind)
    .bind(id)
    .bind(data)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to save object")?;

    Ok(())
}

/// Delete an object; returns whether a row was removed
pub async fn delete_object(pool: &SqlitePool, collection: &str, kind: &str, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM objects WHERE collection = ? AND kind = ? AND id = ?")
        .bind(collection)
        .bind(kind)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete object")?;

    Ok(result.rows_affected() > 0)
}
