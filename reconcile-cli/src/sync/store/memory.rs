use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::SyncStore;
use crate::error::Result;
use crate::sync::types::{
    Mapping, Source, Synchronization, SynchronizationContract, SynchronizationContractLog,
    SynchronizationLog,
};

#[derive(Debug, Default)]
struct Tables {
    synchronizations: HashMap<Uuid, Synchronization>,
    sources: HashMap<Uuid, Source>,
    mappings: HashMap<Uuid, Mapping>,
    /// Insertion-ordered so listings match the SQLite store
    contracts: Vec<SynchronizationContract>,
    run_logs: Vec<SynchronizationLog>,
    contract_logs: Vec<SynchronizationContractLog>,
}

/// In-process [`SyncStore`] with the same upsert semantics as the SQLite store
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn find_synchronization(&self, id: Uuid) -> Result<Option<Synchronization>> {
        Ok(self.tables.read().await.synchronizations.get(&id).cloned())
    }

    async fn list_synchronizations(&self) -> Result<Vec<Synchronization>> {
        let tables = self.tables.read().await;
        let mut all: Vec<_> = tables.synchronizations.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn save_synchronization(&self, synchronization: &Synchronization) -> Result<()> {
        self.tables
            .write()
            .await
            .synchronizations
            .insert(synchronization.id, synchronization.clone());
        Ok(())
    }

    async fn update_current_page(&self, synchronization_id: Uuid, page: u32) -> Result<()> {
        if let Some(sync) = self
            .tables
            .write()
            .await
            .synchronizations
            .get_mut(&synchronization_id)
        {
            sync.current_page = page;
            sync.updated = Utc::now();
        }
        Ok(())
    }

    async fn find_source(&self, id: Uuid) -> Result<Option<Source>> {
        Ok(self.tables.read().await.sources.get(&id).cloned())
    }

    async fn save_source(&self, source: &Source) -> Result<()> {
        self.tables
            .write()
            .await
            .sources
            .insert(source.id, source.clone());
        Ok(())
    }

    async fn find_mapping(&self, id: Uuid) -> Result<Option<Mapping>> {
        Ok(self.tables.read().await.mappings.get(&id).cloned())
    }

    async fn save_mapping(&self, mapping: &Mapping) -> Result<()> {
        self.tables
            .write()
            .await
            .mappings
            .insert(mapping.id, mapping.clone());
        Ok(())
    }

    async fn find_contract_by_origin(
        &self,
        synchronization_id: Uuid,
        origin_id: &str,
    ) -> Result<Option<SynchronizationContract>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contracts
            .iter()
            .find(|c| c.synchronization_id == synchronization_id && c.origin_id == origin_id)
            .cloned())
    }

    async fn find_contract_on_target(
        &self,
        synchronization_id: Uuid,
        target_id: &str,
    ) -> Result<Option<SynchronizationContract>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contracts
            .iter()
            .find(|c| {
                c.synchronization_id == synchronization_id
                    && c.target_id.as_deref() == Some(target_id)
            })
            .cloned())
    }

    async fn find_contracts_by_synchronization(
        &self,
        synchronization_id: Uuid,
    ) -> Result<Vec<SynchronizationContract>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contracts
            .iter()
            .filter(|c| c.synchronization_id == synchronization_id)
            .cloned()
            .collect())
    }

    async fn save_contract(&self, contract: &SynchronizationContract) -> Result<()> {
        let mut tables = self.tables.write().await;
        let existing = tables.contracts.iter_mut().find(|c| {
            c.synchronization_id == contract.synchronization_id && c.origin_id == contract.origin_id
        });

        match existing {
            Some(existing) => {
                let (id, created) = (existing.id, existing.created);
                *existing = contract.clone();
                existing.id = id;
                existing.created = created;
            }
            None => tables.contracts.push(contract.clone()),
        }
        Ok(())
    }

    async fn insert_run_log(&self, log: &SynchronizationLog) -> Result<()> {
        self.tables.write().await.run_logs.push(log.clone());
        Ok(())
    }

    async fn update_run_log(&self, log: &SynchronizationLog) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.run_logs.iter_mut().find(|l| l.id == log.id) {
            *existing = log.clone();
        }
        Ok(())
    }

    async fn list_run_logs(
        &self,
        synchronization_id: Uuid,
        limit: u32,
    ) -> Result<Vec<SynchronizationLog>> {
        let tables = self.tables.read().await;
        Ok(tables
            .run_logs
            .iter()
            .rev()
            .filter(|l| l.synchronization_id == synchronization_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn insert_contract_log(&self, log: &SynchronizationContractLog) -> Result<()> {
        self.tables.write().await.contract_logs.push(log.clone());
        Ok(())
    }

    async fn list_contract_logs(&self, run_log_id: Uuid) -> Result<Vec<SynchronizationContractLog>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contract_logs
            .iter()
            .filter(|l| l.run_log_id == Some(run_log_id))
            .cloned()
            .collect())
    }

    async fn prune_expired_logs(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.run_logs.len() + tables.contract_logs.len();
        tables.run_logs.retain(|l| l.expires >= now);
        tables.contract_logs.retain(|l| l.expires >= now);
        let after = tables.run_logs.len() + tables.contract_logs.len();
        Ok((before - after) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_save_contract_upserts_by_origin() {
        let store = MemoryStore::new();
        let sync_id = Uuid::new_v4();

        let first = SynchronizationContract::new(sync_id, "1");
        store.save_contract(&first).await.unwrap();

        let mut second = SynchronizationContract::new(sync_id, "1");
        second.target_id = Some("t".into());
        store.save_contract(&second).await.unwrap();

        let all = store.find_contracts_by_synchronization(sync_id).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[0].target_id.as_deref(), Some("t"));
        assert!(store.find_contract_on_target(sync_id, "t").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_run_logs_newest_first_and_pruned() {
        let store = MemoryStore::new();
        let sync_id = Uuid::new_v4();

        let first = SynchronizationLog::start(sync_id, false, false, 7);
        let second = SynchronizationLog::start(sync_id, true, false, 7);
        store.insert_run_log(&first).await.unwrap();
        store.insert_run_log(&second).await.unwrap();

        let logs = store.list_run_logs(sync_id, 1).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].id, second.id);

        let removed = store
            .prune_expired_logs(Utc::now() + Duration::days(8))
            .await
            .unwrap();
        assert_eq!(removed, 2);
    }
}
