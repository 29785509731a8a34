//! Run logs and contract logs repository

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{parse_json, parse_optional_uuid, parse_uuid};
use crate::sync::types::{
    ContractLogResult, RunCounters, SynchronizationContractLog, SynchronizationLog,
};

fn run_log_from_row(row: &SqliteRow) -> Result<SynchronizationLog> {
    let id: String = row.try_get("id")?;
    let synchronization_id: String = row.try_get("synchronization_id")?;
    let count = |column: &str| -> Result<u32> { Ok(row.try_get::<i64, _>(column)?.max(0) as u32) };

    Ok(SynchronizationLog {
        id: parse_uuid(&id)?,
        synchronization_id: parse_uuid(&synchronization_id)?,
        counters: RunCounters {
            found: count("found")?,
            skipped: count("skipped")?,
            created: count("created_count")?,
            updated: count("updated_count")?,
            deleted: count("deleted")?,
            invalid: count("invalid")?,
        },
        message: row.try_get("message")?,
        test: row.try_get::<i64, _>("test")? != 0,
        force: row.try_get::<i64, _>("force")? != 0,
        execution_time_ms: row.try_get::<i64, _>("execution_time_ms")?.max(0) as u64,
        created: row.try_get("created")?,
        expires: row.try_get("expires")?,
    })
}

/// Insert a new run log
pub async fn insert_run_log(pool: &SqlitePool, log: &SynchronizationLog) -> Result<()> {
    sqlx::query(
        "INSERT INTO synchronization_logs (id, synchronization_id, found, skipped,
            created_count, updated_count, deleted, invalid, message, test, force,
            execution_time_ms, created, expires)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(log.id.to_string())
    .bind(log.synchronization_id.to_string())
    .bind(log.counters.found as i64)
    .bind(log.counters.skipped as i64)
    .bind(log.counters.created as i64)
    .bind(log.counters.updated as i64)
    .bind(log.counters.deleted as i64)
    .bind(log.counters.invalid as i64)
    .bind(&log.message)
    .bind(log.test as i64)
    .bind(log.force as i64)
    .bind(log.execution_time_ms as i64)
    .bind(log.created)
    .bind(log.expires)
    .execute(pool)
    .await
    .context("Failed to insert run log")?;

    Ok(())
}

/// Write back counters, message and timing of a finished run
pub async fn update_run_log(pool: &SqlitePool, log: &SynchronizationLog) -> Result<()> {
    sqlx::query(
        "UPDATE synchronization_logs SET
            found = ?, skipped = ?, created_count = ?, updated_count = ?,
            deleted = ?, invalid = ?, message = ?, execution_time_ms = ?, expires = ?
         WHERE id = ?",
    )
    .bind(log.counters.found as i64)
    .bind(log.counters.skipped as i64)
    .bind(log.counters.created as i64)
    .bind(log.counters.updated as i64)
    .bind(log.counters.deleted as i64)
    .bind(log.counters.invalid as i64)
    .bind(&log.message)
    .bind(log.execution_time_ms as i64)
    .bind(log.expires)
    .bind(log.id.to_string())
    .execute(pool)
    .await
    .context("Failed to update run log")?;

    Ok(())
}

/// Most recent run logs of a synchronization
pub async fn list_run_logs(
    pool: &SqlitePool,
    synchronization_id: Uuid,
    limit: u32,
) -> Result<Vec<SynchronizationLog>> {
    let rows = sqlx::query(
        "SELECT id, synchronization_id, found, skipped, created_count, updated_count,
                deleted, invalid, message, test, force, execution_time_ms, created, expires
         FROM synchronization_logs
         WHERE synchronization_id = ?
         ORDER BY created DESC
         LIMIT ?",
    )
    .bind(synchronization_id.to_string())
    .bind(limit as i64)
    .fetch_all(pool)
    .await
    .context("Failed to list run logs")?;

    rows.iter().map(run_log_from_row).collect()
}

fn optional_json(raw: Option<String>, column: &str) -> Result<Option<Value>> {
    raw.as_deref().map(|raw| parse_json(raw, column)).transpose()
}

fn contract_log_from_row(row: &SqliteRow) -> Result<SynchronizationContractLog> {
    let id: String = row.try_get("id")?;
    let synchronization_id: String = row.try_get("synchronization_id")?;
    let target_result: String = row.try_get("target_result")?;

    Ok(SynchronizationContractLog {
        id: parse_uuid(&id)?,
        synchronization_id: parse_uuid(&synchronization_id)?,
        contract_id: parse_optional_uuid(row.try_get("contract_id")?)?,
        run_log_id: parse_optional_uuid(row.try_get("run_log_id")?)?,
        origin_id: row.try_get("origin_id")?,
        target_id: row.try_get("target_id")?,
        action: row.try_get("action")?,
        target_result: ContractLogResult::parse(&target_result)
            .with_context(|| format!("Unknown target result: {target_result}"))?,
        error: row.try_get("error")?,
        source_object: optional_json(row.try_get("source_object")?, "source_object")?,
        target_object: optional_json(row.try_get("target_object")?, "target_object")?,
        test: row.try_get::<i64, _>("test")? != 0,
        force: row.try_get::<i64, _>("force")? != 0,
        created: row.try_get("created")?,
        expires: row.try_get("expires")?,
    })
}

/// Append a contract log
pub async fn insert_contract_log(pool: &SqlitePool, log: &SynchronizationContractLog) -> Result<()> {
    let source_object = log
        .source_object
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to serialize source object")?;
    let target_object = log
        .target_object
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to serialize target object")?;

    sqlx::query(
        "INSERT INTO synchronization_contract_logs (id, synchronization_id, contract_id,
            run_log_id, origin_id, target_id, action, target_result, error, source_object,
            target_object, test, force, created, expires)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(log.id.to_string())
    .bind(log.synchronization_id.to_string())
    .bind(log.contract_id.map(|id| id.to_string()))
    .bind(log.run_log_id.map(|id| id.to_string()))
    .bind(&log.origin_id)
    .bind(&log.target_id)
    .bind(&log.action)
    .bind(log.target_result.as_str())
    .bind(&log.error)
    .bind(source_object)
    .bind(target_object)
    .bind(log.test as i64)
    .bind(log.force as i64)
    .bind(log.created)
    .bind(log.expires)
    .execute(pool)
    .await
    .context("Failed to insert contract log")?;

    Ok(())
}

/// Contract logs written during one run, in insertion order
pub async fn list_contract_logs(
    pool: &SqlitePool,
    run_log_id: Uuid,
) -> Result<Vec<SynchronizationContractLog>> {
    let rows = sqlx::query(
        "SELECT id, synchronization_id, contract_id, run_log_id, origin_id, target_id, action,
                target_result, error, source_object, target_object, test, force, created, expires
         FROM synchronization_contract_logs
         WHERE run_log_id = ?
         ORDER BY created, rowid",
    )
    .bind(run_log_id.to_string())
    .fetch_all(pool)
    .await
    .context("Failed to list contract logs")?;

    rows.iter().map(contract_log_from_row).collect()
}

/// Delete run and contract logs whose expiry has passed
///
/// Returns the total number of rows removed.
pub async fn delete_expired_logs(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let mut tx = pool.begin().await.context("Failed to start transaction")?;

    let contract_logs = sqlx::query("DELETE FROM synchronization_contract_logs WHERE expires < ?")
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to prune contract logs")?
        .rows_affected();

    let run_logs = sqlx::query("DELETE FROM synchronization_logs WHERE expires < ?")
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to prune run logs")?
        .rows_affected();

    tx.commit().await.context("Failed to commit transaction")?;

    Ok(contract_logs + run_logs)
}
