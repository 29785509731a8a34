//! Synchronization orchestrator
//!
//! Runs one synchronization end to end: fetch every source object, reconcile
//! each against its contract, delete target objects the source no longer
//! produces and record the run in a run log.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::BoxFuture;
use log::{error, info, warn};
use serde_json::Value;
use uuid::Uuid;

use crate::api::client::HttpCaller;
use crate::error::{Result, SyncError};
use crate::sync::mapping::MappingService;
use crate::sync::objects::ObjectStore;
use crate::sync::reconciler::{Reconciler, RunScope};
use crate::sync::source::{FetchRequest, SourceFetchConfig, SourceRegistry};
use crate::sync::store::SyncStore;
use crate::sync::target::{TargetContext, TargetRegistry};
use crate::sync::types::{Synchronization, SynchronizationLog};

/// Engine-wide behavior, usually derived from [`crate::config::Settings`]
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub log_retention_days: i64,
    /// Write to targets even in test mode
    pub write_targets_in_test: bool,
    pub page_parameter: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            log_retention_days: 7,
            write_targets_in_test: false,
            page_parameter: "page".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Dry run: first object of the first page only, no deletions
    pub test: bool,
    /// Write even when the content hash did not change
    pub force: bool,
}

pub struct SyncEngine {
    store: Arc<dyn SyncStore>,
    sources: SourceRegistry,
    targets: TargetRegistry,
    mapper: Arc<dyn MappingService>,
    settings: EngineSettings,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn SyncStore>,
        http: Arc<dyn HttpCaller>,
        objects: Arc<dyn ObjectStore>,
        mapper: Arc<dyn MappingService>,
        settings: EngineSettings,
    ) -> Self {
        let sources = SourceRegistry::new(http.clone(), store.clone())
            .with_page_parameter(settings.page_parameter.clone());
        let targets = TargetRegistry::new(http, store.clone(), objects);
        Self {
            store,
            sources,
            targets,
            mapper,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn SyncStore> {
        &self.store
    }

    /// Run a synchronization, then its follow-ups when it succeeded
    ///
    /// The run log is persisted before anything is fetched and finalized even
    /// when the run fails; the failure is then returned as well.
    pub async fn synchronize(
        &self,
        synchronization_id: Uuid,
        options: RunOptions,
    ) -> Result<SynchronizationLog> {
        let mut visited = HashSet::new();
        self.synchronize_chain(synchronization_id, options, &mut visited)
            .await
    }

    fn synchronize_chain<'a>(
        &'a self,
        synchronization_id: Uuid,
        options: RunOptions,
        visited: &'a mut HashSet<Uuid>,
    ) -> BoxFuture<'a, Result<SynchronizationLog>> {
        Box::pin(async move {
            visited.insert(synchronization_id);
            let (synchronization, log) = self.run_once(synchronization_id, options).await?;

            if log.is_success() && !options.test {
                for follow_up in &synchronization.follow_ups {
                    if visited.contains(follow_up) {
                        warn!(
                            "Skipping follow-up {} of '{}': already ran in this chain",
                            follow_up, synchronization.name
                        );
                        continue;
                    }
                    info!("Triggering follow-up {} of '{}'", follow_up, synchronization.name);
                    if let Err(e) = self.synchronize_chain(*follow_up, options, visited).await {
                        warn!("Follow-up {} failed: {}", follow_up, e);
                    }
                }
            }

            Ok(log)
        })
    }

    async fn run_once(
        &self,
        synchronization_id: Uuid,
        options: RunOptions,
    ) -> Result<(Synchronization, SynchronizationLog)> {
        let synchronization = self
            .store
            .find_synchronization(synchronization_id)
            .await?
            .ok_or_else(|| SyncError::not_found("synchronization", synchronization_id))?;

        let mut log = SynchronizationLog::start(
            synchronization.id,
            options.test,
            options.force,
            self.settings.log_retention_days,
        );
        self.store.insert_run_log(&log).await?;

        info!(
            "Synchronizing '{}'{}{}",
            synchronization.name,
            if options.test { " (test)" } else { "" },
            if options.force { " (force)" } else { "" }
        );
        let started = Instant::now();
        let result = self.execute(&synchronization, &mut log, options).await;

        log.execution_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        log.message = Some(match &result {
            Ok(()) => "Success".to_string(),
            Err(e) => e.to_string(),
        });
        self.store.update_run_log(&log).await?;

        let c = log.counters;
        match result {
            Ok(()) => {
                info!(
                    "'{}' done in {}ms: found {}, created {}, updated {}, skipped {}, deleted {}, invalid {}",
                    synchronization.name,
                    log.execution_time_ms,
                    c.found,
                    c.created,
                    c.updated,
                    c.skipped,
                    c.deleted,
                    c.invalid
                );
                Ok((synchronization, log))
            }
            Err(e) => {
                error!("'{}' failed: {}", synchronization.name, e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        synchronization: &Synchronization,
        log: &mut SynchronizationLog,
        options: RunOptions,
    ) -> Result<()> {
        let mut source = self
            .store
            .find_source(synchronization.source_id)
            .await?
            .ok_or_else(|| SyncError::not_found("source", synchronization.source_id))?;

        let mapping = match synchronization.mapping_id {
            Some(id) => Some(
                self.store
                    .find_mapping(id)
                    .await?
                    .ok_or_else(|| SyncError::not_found("mapping", id))?,
            ),
            None => None,
        };

        // Fail before fetching when nothing could write the objects
        self.targets.connector_for(&synchronization.target_type)?;

        let config = SourceFetchConfig::from_value(&synchronization.source_config)?;
        let id_position = config.id_position().to_string();

        let fetched = self
            .sources
            .get_all_objects(
                &mut source,
                FetchRequest {
                    synchronization_id: Some(synchronization.id),
                    config,
                    is_test: options.test,
                    current_page: synchronization.current_page,
                    ..Default::default()
                },
            )
            .await?;
        log.counters.found = u32::try_from(fetched.objects.len()).unwrap_or(u32::MAX);

        let scope = RunScope {
            synchronization,
            mapping: mapping.as_ref(),
            id_position: &id_position,
            target: TargetContext {
                run_log_id: Some(log.id),
                test: options.test,
                force: options.force,
                retention_days: self.settings.log_retention_days,
            },
            persist: !options.test || self.settings.write_targets_in_test,
        };
        let reconciler = Reconciler::new(self.store.as_ref(), &self.targets, self.mapper.as_ref());

        let mut valid_target_ids = HashSet::new();
        for object in &fetched.objects {
            let reconciled = reconciler.reconcile(&scope, object).await?;
            reconciled.outcome.count(&mut log.counters);
            valid_target_ids.extend(reconciled.target_id);
        }

        if options.test {
            return Ok(());
        }
        if !fetched.from_first_page {
            info!(
                "'{}' resumed at page {}, skipping deletion of stale objects",
                synchronization.name, synchronization.current_page
            );
            return Ok(());
        }

        log.counters.deleted += self
            .targets
            .delete_invalid_objects(synchronization, &valid_target_ids, &scope.target)
            .await?;
        Ok(())
    }

    /// Fetch a single object from a source, outside of any synchronization
    pub async fn fetch_object(&self, source_id: Uuid, endpoint: &str) -> Result<Value> {
        let mut source = self
            .store
            .find_source(source_id)
            .await?
            .ok_or_else(|| SyncError::not_found("source", source_id))?;
        self.sources
            .get_object(
                &mut source,
                endpoint,
                &SourceFetchConfig::default(),
                BTreeMap::new(),
                Vec::new(),
            )
            .await
    }

    /// Remove run and contract logs past their expiry
    pub async fn prune_logs(&self) -> Result<u64> {
        let removed = self.store.prune_expired_logs(Utc::now()).await?;
        if removed > 0 {
            info!("Pruned {} expired log record(s)", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::{CallConfig, HttpResponse};
    use crate::sync::mapping::PathMapper;
    use crate::sync::objects::MemoryObjectStore;
    use crate::sync::store::MemoryStore;
    use crate::sync::types::Source;
    use async_trait::async_trait;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves a fixed list per endpoint; later pages are empty
    #[derive(Default)]
    struct StaticHttp {
        bodies: Mutex<BTreeMap<String, Value>>,
    }

    impl StaticHttp {
        fn serve(&self, endpoint: &str, body: Value) {
            self.bodies
                .lock()
                .unwrap()
                .insert(endpoint.to_string(), body);
        }
    }

    #[async_trait]
    impl HttpCaller for StaticHttp {
        async fn call(&self, _: &Source, endpoint: &str, _: Method, config: &CallConfig) -> Result<HttpResponse> {
            if config.query.iter().any(|(k, _)| k == "page") {
                return Ok(HttpResponse::new(200, "[]"));
            }
            let body = self
                .bodies
                .lock()
                .unwrap()
                .get(endpoint)
                .cloned()
                .unwrap_or(Value::Null);
            Ok(HttpResponse::new(200, body.to_string()))
        }
    }

    struct Fixture {
        http: Arc<StaticHttp>,
        store: Arc<MemoryStore>,
        objects: Arc<MemoryObjectStore>,
        engine: SyncEngine,
    }

    fn fixture() -> Fixture {
        let http = Arc::new(StaticHttp::default());
        let store = Arc::new(MemoryStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let engine = SyncEngine::new(
            store.clone(),
            http.clone(),
            objects.clone(),
            Arc::new(PathMapper),
            EngineSettings::default(),
        );
        Fixture {
            http,
            store,
            objects,
            engine,
        }
    }

    async fn add_sync(fixture: &Fixture, endpoint: &str) -> Synchronization {
        let source = Source::new("src", "json", "https://src.test");
        fixture.store.save_source(&source).await.unwrap();
        let sync = Synchronization::new("people", source.id, "json", "object-store", "crm/person")
            .with_source_config(json!({"endpoint": endpoint}));
        fixture.store.save_synchronization(&sync).await.unwrap();
        sync
    }

    #[tokio::test]
    async fn test_unknown_synchronization() {
        let fixture = fixture();
        let err = fixture
            .engine
            .synchronize(Uuid::new_v4(), RunOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_failed_run_is_logged() {
        let fixture = fixture();
        let mut sync = add_sync(&fixture, "/people").await;
        sync.target_type = "ftp".into();
        fixture.store.save_synchronization(&sync).await.unwrap();

        let err = fixture
            .engine
            .synchronize(sync.id, RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedTargetType(_)));

        let logs = fixture.store.list_run_logs(sync.id, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert!(!logs[0].is_success());
        assert!(logs[0].message.as_deref().unwrap().contains("ftp"));
    }

    #[tokio::test]
    async fn test_test_run_changes_nothing() {
        let fixture = fixture();
        let sync = add_sync(&fixture, "/people").await;
        fixture.http.serve("/people", json!([{"id": 1}, {"id": 2}]));

        let log = fixture
            .engine
            .synchronize(sync.id, RunOptions { test: true, force: false })
            .await
            .unwrap();
        assert_eq!(log.counters.found, 1);
        assert_eq!(log.counters.created, 1);
        assert!(fixture.objects.is_empty().await);
        assert!(
            fixture
                .store
                .find_contracts_by_synchronization(sync.id)
                .await
                .unwrap()
                .is_empty()
        );

        let contract_logs = fixture.store.list_contract_logs(log.id).await.unwrap();
        assert_eq!(contract_logs.len(), 1);
        assert!(contract_logs[0].test);
    }

    #[tokio::test]
    async fn test_follow_ups_run_once() {
        let fixture = fixture();
        fixture.http.serve("/a", json!([{"id": 1}]));
        fixture.http.serve("/b", json!([{"id": 2}]));

        let a = add_sync(&fixture, "/a").await;
        let mut b = add_sync(&fixture, "/b").await;
        b.target_id = "crm/other".into();
        b.follow_ups = vec![a.id];
        let a = a.with_follow_up(b.id);
        fixture.store.save_synchronization(&a).await.unwrap();
        fixture.store.save_synchronization(&b).await.unwrap();

        fixture
            .engine
            .synchronize(a.id, RunOptions::default())
            .await
            .unwrap();

        assert_eq!(fixture.store.list_run_logs(a.id, 10).await.unwrap().len(), 1);
        assert_eq!(fixture.store.list_run_logs(b.id, 10).await.unwrap().len(), 1);
        assert_eq!(fixture.objects.len().await, 2);
    }

    #[tokio::test]
    async fn test_resumed_run_skips_deletion() {
        let fixture = fixture();
        fixture.http.serve("/people", json!([{"id": 1}, {"id": 2}]));
        let sync = add_sync(&fixture, "/people").await;
        fixture
            .engine
            .synchronize(sync.id, RunOptions::default())
            .await
            .unwrap();

        // Interrupted run left the cursor at page 2
        fixture.store.update_current_page(sync.id, 2).await.unwrap();
        let log = fixture
            .engine
            .synchronize(sync.id, RunOptions::default())
            .await
            .unwrap();
        assert_eq!(log.counters.found, 0);
        assert_eq!(log.counters.deleted, 0);
        assert_eq!(fixture.objects.len().await, 2);

        let stored = fixture.store.find_synchronization(sync.id).await.unwrap().unwrap();
        assert_eq!(stored.current_page, 1);
    }

    #[tokio::test]
    async fn test_prune_logs() {
        let fixture = fixture();
        assert_eq!(fixture.engine.prune_logs().await.unwrap(), 0);
    }
}
