//! Synchronization contracts repository

use anyhow::{Context, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_optional_uuid, parse_uuid};
use crate::sync::types::{SynchronizationContract, TargetAction};

const SELECT_CONTRACT: &str = "SELECT id, synchronization_id, parent_id, origin_id, origin_hash,
        target_id, target_hash, target_last_action, source_last_checked, target_last_synced,
        try_counter, retry_after, created, updated
 FROM synchronization_contracts";

fn contract_from_row(row: &SqliteRow) -> Result<SynchronizationContract> {
    let id: String = row.try_get("id")?;
    let synchronization_id: String = row.try_get("synchronization_id")?;
    let action: Option<String> = row.try_get("target_last_action")?;

    Ok(SynchronizationContract {
        id: parse_uuid(&id)?,
        synchronization_id: parse_uuid(&synchronization_id)?,
        parent_id: parse_optional_uuid(row.try_get("parent_id")?)?,
        origin_id: row.try_get("origin_id")?,
        origin_hash: row.try_get("origin_hash")?,
        target_id: row.try_get("target_id")?,
        target_hash: row.try_get("target_hash")?,
        target_last_action: action.as_deref().and_then(TargetAction::parse),
        source_last_checked: row.try_get("source_last_checked")?,
        target_last_synced: row.try_get("target_last_synced")?,
        try_counter: row.try_get::<i64, _>("try_counter")?.max(0) as u32,
        retry_after: row.try_get("retry_after")?,
        created: row.try_get("created")?,
        updated: row.try_get("updated")?,
    })
}

/// Find the contract for an origin object
pub async fn get_contract_by_origin(
    pool: &SqlitePool,
    synchronization_id: Uuid,
    origin_id: &str,
) -> Result<Option<SynchronizationContract>> {
    let row = sqlx::query(&format!(
        "{SELECT_CONTRACT} WHERE synchronization_id = ? AND origin_id = ?"
    ))
    .bind(synchronization_id.to_string())
    .bind(origin_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get contract by origin")?;

    row.as_ref().map(contract_from_row).transpose()
}

/// Find the contract pointing at a target identity
pub async fn get_contract_on_target(
    pool: &SqlitePool,
    synchronization_id: Uuid,
    target_id: &str,
) -> Result<Option<SynchronizationContract>> {
    let row = sqlx::query(&format!(
        "{SELECT_CONTRACT} WHERE synchronization_id = ? AND target_id = ? LIMIT 1"
    ))
    .bind(synchronization_id.to_string())
    .bind(target_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get contract on target")?;

    row.as_ref().map(contract_from_row).transpose()
}

/// All contracts of a synchronization, oldest first
pub async fn list_contracts(
    pool: &SqlitePool,
    synchronization_id: Uuid,
) -> Result<Vec<SynchronizationContract>> {
    let rows = sqlx::query(&format!(
        "{SELECT_CONTRACT} WHERE synchronization_id = ? ORDER BY created, origin_id"
    ))
    .bind(synchronization_id.to_string())
    .fetch_all(pool)
    .await
    .context("Failed to list contracts")?;

    rows.iter().map(contract_from_row).collect()
}

/// Insert or update a contract keyed by `(synchronization_id, origin_id)`
///
/// When a row for the pair already exists its id and creation time are kept.
pub async fn upsert_contract(pool: &SqlitePool, contract: &SynchronizationContract) -> Result<()> {
    sqlx::query(
        "INSERT INTO synchronization_contracts (id, synchronization_id, parent_id, origin_id,
            origin_hash, target_id, target_hash, target_last_action, source_last_checked,
            target_last_synced, try_counter, retry_after, created, updated)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(synchronization_id, origin_id) DO UPDATE SET
            parent_id = excluded.parent_id,
            origin_hash = excluded.origin_hash,
            target_id = excluded.target_id,
            target_hash = excluded.target_hash,
            target_last_action = excluded.target_last_action,
            source_last_checked = excluded.source_last_checked,
            target_last_synced = excluded.target_last_synced,
            try_counter = excluded.try_counter,
            retry_after = excluded.retry_after,
            updated = excluded.updated",
    )
    .bind(contract.id.to_string())
    .bind(contract.synchronization_id.to_string())
    .bind(contract.parent_id.map(|id| id.to_string()))
    .bind(&contract.origin_id)
    .bind(&contract.origin_hash)
    .bind(&contract.target_id)
    .bind(&contract.target_hash)
    .bind(contract.target_last_action.map(|action| action.as_str()))
    .bind(contract.source_last_checked)
    .bind(contract.target_last_synced)
    .bind(contract.try_counter as i64)
    .bind(contract.retry_after)
    .bind(contract.created)
    .bind(contract.updated)
    .execute(pool)
    .await
    .context("Failed to save contract")?;

    Ok(())
}
