//! Contract store: persistence of configuration, contracts and logs
//!
//! The engine only sees [`SyncStore`]; [`SqliteStore`] backs the CLI and
//! [`MemoryStore`] backs tests and embedded use.

mod memory;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::sync::types::{
    Mapping, Source, Synchronization, SynchronizationContract, SynchronizationContractLog,
    SynchronizationLog,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn find_synchronization(&self, id: Uuid) -> Result<Option<Synchronization>>;
    async fn list_synchronizations(&self) -> Result<Vec<Synchronization>>;
    async fn save_synchronization(&self, synchronization: &Synchronization) -> Result<()>;
    /// Move the page cursor without touching the rest of the configuration
    async fn update_current_page(&self, synchronization_id: Uuid, page: u32) -> Result<()>;

    async fn find_source(&self, id: Uuid) -> Result<Option<Source>>;
    async fn save_source(&self, source: &Source) -> Result<()>;

    async fn find_mapping(&self, id: Uuid) -> Result<Option<Mapping>>;
    async fn save_mapping(&self, mapping: &Mapping) -> Result<()>;

    async fn find_contract_by_origin(
        &self,
        synchronization_id: Uuid,
        origin_id: &str,
    ) -> Result<Option<SynchronizationContract>>;
    async fn find_contract_on_target(
        &self,
        synchronization_id: Uuid,
        target_id: &str,
    ) -> Result<Option<SynchronizationContract>>;
    async fn find_contracts_by_synchronization(
        &self,
        synchronization_id: Uuid,
    ) -> Result<Vec<SynchronizationContract>>;
    /// Upsert keyed by `(synchronization_id, origin_id)`
    async fn save_contract(&self, contract: &SynchronizationContract) -> Result<()>;

    async fn insert_run_log(&self, log: &SynchronizationLog) -> Result<()>;
    async fn update_run_log(&self, log: &SynchronizationLog) -> Result<()>;
    async fn list_run_logs(&self, synchronization_id: Uuid, limit: u32)
    -> Result<Vec<SynchronizationLog>>;
    async fn insert_contract_log(&self, log: &SynchronizationContractLog) -> Result<()>;
    async fn list_contract_logs(&self, run_log_id: Uuid) -> Result<Vec<SynchronizationContractLog>>;
    /// Remove run and contract logs that expired before `now`
    async fn prune_expired_logs(&self, now: DateTime<Utc>) -> Result<u64>;
}
