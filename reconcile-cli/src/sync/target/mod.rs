//! Target connectors and their registry

pub mod api;
pub mod object_store;
pub mod sub_objects;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::Value;
use uuid::Uuid;

use crate::api::client::HttpCaller;
use crate::error::{Result, SyncError};
use crate::sync::objects::ObjectStore;
use crate::sync::store::SyncStore;
use crate::sync::types::{
    ContractLogResult, Synchronization, SynchronizationContract, SynchronizationContractLog,
};

/// What to do with the target object of a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Save,
    Delete,
}

/// Run-scoped settings passed down to target writes
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetContext {
    pub run_log_id: Option<Uuid>,
    pub test: bool,
    pub force: bool,
    pub retention_days: i64,
}

impl TargetContext {
    /// Contract log stamped with this run's id and flags
    pub fn contract_log(
        &self,
        contract: &SynchronizationContract,
        result: ContractLogResult,
    ) -> SynchronizationContractLog {
        let mut log =
            SynchronizationContractLog::new(contract.synchronization_id, result, self.retention_days);
        log.contract_id = Some(contract.id);
        log.run_log_id = self.run_log_id;
        log.origin_id = Some(contract.origin_id.clone());
        log.target_id = contract.target_id.clone();
        log.action = contract.target_last_action.map(|a| a.as_str().to_string());
        log.test = self.test;
        log.force = self.force;
        log
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetConnector {
    /// Generic REST API described by a source record
    Api,
    /// Internal object store
    ObjectStore,
}

impl TargetConnector {
    pub fn can_handle(&self, target_type: &str) -> bool {
        let target_type = target_type.to_ascii_lowercase();
        match self {
            Self::Api => matches!(target_type.as_str(), "api" | "rest"),
            Self::ObjectStore => matches!(target_type.as_str(), "object-store" | "register/schema"),
        }
    }
}

/// Ordered target connectors plus the collaborators they write through
pub struct TargetRegistry {
    connectors: Vec<TargetConnector>,
    http: Arc<dyn HttpCaller>,
    store: Arc<dyn SyncStore>,
    objects: Arc<dyn ObjectStore>,
}

impl TargetRegistry {
    pub fn new(
        http: Arc<dyn HttpCaller>,
        store: Arc<dyn SyncStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            connectors: vec![TargetConnector::Api, TargetConnector::ObjectStore],
            http,
            store,
            objects,
        }
    }

    pub fn connector_for(&self, target_type: &str) -> Result<TargetConnector> {
        self.connectors
            .iter()
            .copied()
            .find(|c| c.can_handle(target_type))
            .ok_or_else(|| SyncError::UnsupportedTargetType(target_type.to_string()))
    }

    /// Write (or delete) the target object of `contract`
    ///
    /// Returns the contract with its target identity, hash and last action
    /// updated. Persisting the contract is left to the caller.
    pub async fn update_target(
        &self,
        contract: SynchronizationContract,
        synchronization: &Synchronization,
        target_object: &Value,
        action: WriteAction,
        ctx: &TargetContext,
    ) -> Result<SynchronizationContract> {
        if action == WriteAction::Delete && contract.target_id.is_none() {
            debug!(
                "Contract {} has no target object, nothing to delete",
                contract.id
            );
            return Ok(contract);
        }

        match self.connector_for(&synchronization.target_type)? {
            TargetConnector::Api => {
                api::write(
                    self.http.as_ref(),
                    self.store.as_ref(),
                    contract,
                    synchronization,
                    target_object,
                    action,
                )
                .await
            }
            TargetConnector::ObjectStore => {
                object_store::write(
                    self.objects.as_ref(),
                    self.store.as_ref(),
                    contract,
                    synchronization,
                    target_object,
                    action,
                    ctx,
                )
                .await
            }
        }
    }

    /// Delete target objects no longer produced by the source
    ///
    /// Every top-level contract whose target id is not in `valid_target_ids`
    /// has its target object deleted. Failures are logged and skipped; the
    /// number of successful deletions is returned.
    pub async fn delete_invalid_objects(
        &self,
        synchronization: &Synchronization,
        valid_target_ids: &HashSet<String>,
        ctx: &TargetContext,
    ) -> Result<u32> {
        let stale: Vec<String> = self
            .store
            .find_contracts_by_synchronization(synchronization.id)
            .await?
            .into_iter()
            .filter(|c| c.parent_id.is_none())
            .filter_map(|c| c.target_id)
            .filter(|id| !valid_target_ids.contains(id))
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }
        info!(
            "Deleting {} stale target object(s) for '{}'",
            stale.len(),
            synchronization.name
        );

        let mut deleted = 0;
        for target_id in stale {
            match self
                .delete_one(synchronization, &target_id, ctx)
                .await
            {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to delete target object {}: {}", target_id, e),
            }
        }
        Ok(deleted)
    }

    async fn delete_one(
        &self,
        synchronization: &Synchronization,
        target_id: &str,
        ctx: &TargetContext,
    ) -> Result<bool> {
        let Some(contract) = self
            .store
            .find_contract_on_target(synchronization.id, target_id)
            .await?
        else {
            return Ok(false);
        };

        let mut contract = self
            .update_target(contract, synchronization, &Value::Null, WriteAction::Delete, ctx)
            .await?;
        contract.target_last_synced = Some(Utc::now());
        self.store.save_contract(&contract).await?;

        let mut log = ctx.contract_log(&contract, ContractLogResult::Deleted);
        log.target_id = Some(target_id.to_string());
        self.store.insert_contract_log(&log).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::{CallConfig, HttpResponse};
    use crate::sync::objects::MemoryObjectStore;
    use crate::sync::store::MemoryStore;
    use crate::sync::types::{Source, TargetAction};
    use async_trait::async_trait;
    use reqwest::Method;
    use serde_json::json;

    struct NoHttp;

    #[async_trait]
    impl HttpCaller for NoHttp {
        async fn call(&self, _: &Source, endpoint: &str, _: Method, _: &CallConfig) -> Result<HttpResponse> {
            Err(SyncError::SourceFetch(format!("unexpected call to {endpoint}")))
        }
    }

    /// Memory object store that cannot delete one particular object
    struct StuckObject {
        inner: MemoryObjectStore,
        stuck_id: String,
    }

    #[async_trait]
    impl ObjectStore for StuckObject {
        async fn save_object(&self, collection: &str, kind: &str, object: Value) -> Result<Value> {
            self.inner.save_object(collection, kind, object).await
        }
        async fn delete_object(&self, collection: &str, kind: &str, id: &str) -> Result<()> {
            if id == self.stuck_id {
                return Err(SyncError::TargetWrite(format!("{id} is locked")));
            }
            self.inner.delete_object(collection, kind, id).await
        }
        async fn find_object(&self, collection: &str, kind: &str, id: &str) -> Result<Option<Value>> {
            self.inner.find_object(collection, kind, id).await
        }
        async fn list_objects(&self, collection: &str, kind: &str) -> Result<Vec<Value>> {
            self.inner.list_objects(collection, kind).await
        }
    }

    fn registry(store: Arc<MemoryStore>, objects: Arc<MemoryObjectStore>) -> TargetRegistry {
        TargetRegistry::new(Arc::new(NoHttp), store, objects)
    }

    #[test]
    fn test_connector_selection() {
        let registry = registry(Arc::new(MemoryStore::new()), Arc::new(MemoryObjectStore::new()));
        assert_eq!(registry.connector_for("API").unwrap(), TargetConnector::Api);
        assert_eq!(
            registry.connector_for("object-store").unwrap(),
            TargetConnector::ObjectStore
        );
        assert!(matches!(
            registry.connector_for("ftp"),
            Err(SyncError::UnsupportedTargetType(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_without_target_is_noop() {
        let registry = registry(Arc::new(MemoryStore::new()), Arc::new(MemoryObjectStore::new()));
        let sync = Synchronization::new("s", Uuid::new_v4(), "json", "object-store", "crm/person");
        let contract = SynchronizationContract::new(sync.id, "1");

        let result = registry
            .update_target(
                contract.clone(),
                &sync,
                &Value::Null,
                WriteAction::Delete,
                &TargetContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(result, contract);
    }

    #[tokio::test]
    async fn test_delete_invalid_objects() {
        let store = Arc::new(MemoryStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let registry = registry(store.clone(), objects.clone());
        let sync = Synchronization::new("s", Uuid::new_v4(), "json", "object-store", "crm/person");
        let ctx = TargetContext {
            retention_days: 7,
            ..Default::default()
        };

        let mut ids = Vec::new();
        for origin in ["1", "2"] {
            let contract = registry
                .update_target(
                    SynchronizationContract::new(sync.id, origin),
                    &sync,
                    &json!({"origin": origin}),
                    WriteAction::Save,
                    &ctx,
                )
                .await
                .unwrap();
            ids.push(contract.target_id.clone().unwrap());
            store.save_contract(&contract).await.unwrap();
        }

        let valid = HashSet::from([ids[0].clone()]);
        let deleted = registry
            .delete_invalid_objects(&sync, &valid, &ctx)
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(objects.len().await, 1);

        let contract = store
            .find_contract_by_origin(sync.id, "2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contract.target_id, None);
        assert_eq!(contract.target_last_action, Some(TargetAction::Delete));

        // Nothing left to delete the second time around
        let deleted = registry
            .delete_invalid_objects(&sync, &valid, &ctx)
            .await
            .unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn test_failed_stale_deletion_does_not_stop_the_sweep() {
        let store = Arc::new(MemoryStore::new());
        let objects = Arc::new(StuckObject {
            inner: MemoryObjectStore::new(),
            stuck_id: "p2".to_string(),
        });
        let registry = TargetRegistry::new(Arc::new(NoHttp), store.clone(), objects.clone());
        let sync = Synchronization::new("s", Uuid::new_v4(), "json", "object-store", "crm/person");
        let ctx = TargetContext {
            retention_days: 7,
            ..Default::default()
        };

        for (origin, target) in [("1", "p1"), ("2", "p2"), ("3", "p3")] {
            objects
                .save_object("crm", "person", json!({"id": target}))
                .await
                .unwrap();
            let mut contract = SynchronizationContract::new(sync.id, origin);
            contract.target_id = Some(target.to_string());
            store.save_contract(&contract).await.unwrap();
        }

        let deleted = registry
            .delete_invalid_objects(&sync, &HashSet::new(), &ctx)
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        let remaining = objects.list_objects("crm", "person").await.unwrap();
        assert_eq!(remaining, vec![json!({"id": "p2"})]);

        // The stuck object keeps its contract so the next sweep retries it
        let stuck = store
            .find_contract_by_origin(sync.id, "2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stuck.target_id.as_deref(), Some("p2"));
        for origin in ["1", "3"] {
            let gone = store
                .find_contract_by_origin(sync.id, origin)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(gone.target_id, None);
        }
    }
}
