use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::SyncStore;
use crate::config::repository::{contracts, logs, mappings, sources, synchronizations};
use crate::error::Result;
use crate::sync::types::{
    Mapping, Source, Synchronization, SynchronizationContract, SynchronizationContractLog,
    SynchronizationLog,
};

/// [`SyncStore`] over the repository functions
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl SyncStore for SqliteStore {
    async fn find_synchronization(&self, id: Uuid) -> Result<Option<Synchronization>> {
        Ok(synchronizations::get_synchronization(&self.pool, id).await?)
    }

    async fn list_synchronizations(&self) -> Result<Vec<Synchronization>> {
        Ok(synchronizations::list_synchronizations(&self.pool).await?)
    }

    async fn save_synchronization(&self, synchronization: &Synchronization) -> Result<()> {
        Ok(synchronizations::save_synchronization(&self.pool, synchronization).await?)
    }

    async fn update_current_page(&self, synchronization_id: Uuid, page: u32) -> Result<()> {
        Ok(synchronizations::set_current_page(&self.pool, synchronization_id, page).await?)
    }

    async fn find_source(&self, id: Uuid) -> Result<Option<Source>> {
        Ok(sources::get_source(&self.pool, id).await?)
    }

    async fn save_source(&self, source: &Source) -> Result<()> {
        Ok(sources::save_source(&self.pool, source).await?)
    }

    async fn find_mapping(&self, id: Uuid) -> Result<Option<Mapping>> {
        Ok(mappings::get_mapping(&self.pool, id).await?)
    }

    async fn save_mapping(&self, mapping: &Mapping) -> Result<()> {
        Ok(mappings::save_mapping(&self.pool, mapping).await?)
    }

    async fn find_contract_by_origin(
        &self,
        synchronization_id: Uuid,
        origin_id: &str,
    ) -> Result<Option<SynchronizationContract>> {
        Ok(contracts::get_contract_by_origin(&self.pool, synchronization_id, origin_id).await?)
    }

    async fn find_contract_on_target(
        &self,
        synchronization_id: Uuid,
        target_id: &str,
    ) -> Result<Option<SynchronizationContract>> {
        Ok(contracts::get_contract_on_target(&self.pool, synchronization_id, target_id).await?)
    }

    async fn find_contracts_by_synchronization(
        &self,
        synchronization_id: Uuid,
    ) -> Result<Vec<SynchronizationContract>> {
        Ok(contracts::list_contracts(&self.pool, synchronization_id).await?)
    }

    async fn save_contract(&self, contract: &SynchronizationContract) -> Result<()> {
        Ok(contracts::upsert_contract(&self.pool, contract).await?)
    }

    async fn insert_run_log(&self, log: &SynchronizationLog) -> Result<()> {
        Ok(logs::insert_run_log(&self.pool, log).await?)
    }

    async fn update_run_log(&self, log: &SynchronizationLog) -> Result<()> {
        Ok(logs::update_run_log(&self.pool, log).await?)
    }

    async fn list_run_logs(
        &self,
        synchronization_id: Uuid,
        limit: u32,
    ) -> Result<Vec<SynchronizationLog>> {
        Ok(logs::list_run_logs(&self.pool, synchronization_id, limit).await?)
    }

    async fn insert_contract_log(&self, log: &SynchronizationContractLog) -> Result<()> {
        Ok(logs::insert_contract_log(&self.pool, log).await?)
    }

    async fn list_contract_logs(&self, run_log_id: Uuid) -> Result<Vec<SynchronizationContractLog>> {
        Ok(logs::list_contract_logs(&self.pool, run_log_id).await?)
    }

    async fn prune_expired_logs(&self, now: DateTime<Utc>) -> Result<u64> {
        Ok(logs::delete_expired_logs(&self.pool, now).await?)
    }
}
