//! Per-object reconciliation
//!
//! Decides for one source object whether the target needs a write, performs
//! it through the target registry and records the outcome on the contract
//! and in the contract log. Object-level failures end up as `Invalid`; only
//! errors for which [`SyncError::aborts_run`] holds escape.

use chrono::Utc;
use log::{debug, warn};
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::sync::hash::content_hash;
use crate::sync::mapping::{MappingService, resolve_id, resolve_path};
use crate::sync::store::SyncStore;
use crate::sync::target::{TargetContext, TargetRegistry, WriteAction};
use crate::sync::types::{
    ContractLogResult, Mapping, RunCounters, Synchronization, SynchronizationContract,
    SynchronizationContractLog,
};

/// Terminal state of one reconciled object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOutcome {
    Created,
    Updated,
    Skipped,
    Invalid,
}

impl ObjectOutcome {
    pub fn count(self, counters: &mut RunCounters) {
        match self {
            Self::Created => counters.created += 1,
            Self::Updated => counters.updated += 1,
            Self::Skipped => counters.skipped += 1,
            Self::Invalid => counters.invalid += 1,
        }
    }

    fn log_result(self) -> ContractLogResult {
        match self {
            Self::Created => ContractLogResult::Created,
            Self::Updated => ContractLogResult::Updated,
            Self::Skipped => ContractLogResult::Skipped,
            Self::Invalid => ContractLogResult::Invalid,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub outcome: ObjectOutcome,
    /// Target identity still backed by the source after this object
    pub target_id: Option<String>,
}

impl Reconciled {
    fn new(outcome: ObjectOutcome, target_id: Option<String>) -> Self {
        Self { outcome, target_id }
    }
}

/// Everything that stays fixed while the objects of one run are reconciled
pub struct RunScope<'a> {
    pub synchronization: &'a Synchronization,
    pub mapping: Option<&'a Mapping>,
    pub id_position: &'a str,
    pub target: TargetContext,
    /// False in test mode unless targets are written in test runs
    pub persist: bool,
}

/// True when every `conditions` entry (dotted path → expected value) matches
pub fn matches_conditions(conditions: Option<&Value>, object: &Value) -> bool {
    match conditions {
        Some(Value::Object(expected)) => expected
            .iter()
            .all(|(path, value)| resolve_path(object, path) == Some(value)),
        _ => true,
    }
}

pub struct Reconciler<'a> {
    store: &'a dyn SyncStore,
    targets: &'a TargetRegistry,
    mapper: &'a dyn MappingService,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        store: &'a dyn SyncStore,
        targets: &'a TargetRegistry,
        mapper: &'a dyn MappingService,
    ) -> Self {
        Self {
            store,
            targets,
            mapper,
        }
    }

    pub async fn reconcile(&self, scope: &RunScope<'_>, object: &Value) -> Result<Reconciled> {
        let sync = scope.synchronization;

        let Some(origin_id) = resolve_id(object, scope.id_position) else {
            let mut log = SynchronizationContractLog::new(
                sync.id,
                ContractLogResult::Invalid,
                scope.target.retention_days,
            );
            log.run_log_id = scope.target.run_log_id;
            log.test = scope.target.test;
            log.force = scope.target.force;
            log.error = Some(format!("no identifier at '{}'", scope.id_position));
            log.source_object = Some(object.clone());
            self.store.insert_contract_log(&log).await?;
            return Ok(Reconciled::new(ObjectOutcome::Invalid, None));
        };

        if !matches_conditions(sync.conditions.as_ref(), object) {
            debug!("Object {} does not match the conditions of '{}'", origin_id, sync.name);
            return Ok(Reconciled::new(ObjectOutcome::Skipped, None));
        }

        let now = Utc::now();
        let existing = self
            .store
            .find_contract_by_origin(sync.id, &origin_id)
            .await?;
        let is_new = existing.is_none();
        let mut contract =
            existing.unwrap_or_else(|| SynchronizationContract::new(sync.id, origin_id.clone()));

        if contract.is_backing_off(now) && !scope.target.force {
            debug!(
                "Contract {} backs off until {:?}",
                contract.id, contract.retry_after
            );
            let target_id = contract.target_id.clone();
            self.log(scope, &contract, ObjectOutcome::Skipped, object, None, None)
                .await?;
            return Ok(Reconciled::new(ObjectOutcome::Skipped, target_id));
        }

        let mapped = match scope.mapping {
            Some(mapping) => self.mapper.apply_mapping(mapping, object),
            None => Ok(object.clone()),
        };
        let mapped = match mapped {
            Ok(mapped) => mapped,
            Err(e) => {
                warn!("Mapping object {} failed: {}", origin_id, e);
                // The contract log must reference a stored contract
                if is_new && scope.persist {
                    contract.source_last_checked = Some(now);
                    self.store.save_contract(&contract).await?;
                }
                let target_id = contract.target_id.clone();
                self.log(scope, &contract, ObjectOutcome::Invalid, object, None, Some(&e))
                    .await?;
                return Ok(Reconciled::new(ObjectOutcome::Invalid, target_id));
            }
        };

        let hash = content_hash(&mapped);
        contract.source_last_checked = Some(now);

        let changed = contract.origin_hash.as_deref() != Some(hash.as_str());
        let needs_write = is_new || changed || contract.target_id.is_none() || scope.target.force;

        if !needs_write {
            contract.updated = now;
            if scope.persist {
                self.store.save_contract(&contract).await?;
            }
            let target_id = contract.target_id.clone();
            self.log(scope, &contract, ObjectOutcome::Skipped, object, Some(&mapped), None)
                .await?;
            return Ok(Reconciled::new(ObjectOutcome::Skipped, target_id));
        }

        let outcome = if contract.target_id.is_none() {
            ObjectOutcome::Created
        } else {
            ObjectOutcome::Updated
        };

        if !scope.persist {
            debug!("Test run: would {:?} object {}", outcome, origin_id);
            let target_id = contract.target_id.clone();
            self.log(scope, &contract, outcome, object, Some(&mapped), None)
                .await?;
            return Ok(Reconciled::new(outcome, target_id));
        }

        let previous_target = contract.target_id.clone();
        match self
            .targets
            .update_target(contract.clone(), sync, &mapped, WriteAction::Save, &scope.target)
            .await
        {
            Ok(mut written) => {
                written.origin_hash = Some(hash);
                written.target_last_synced = Some(Utc::now());
                written.reset_failures();
                self.store.save_contract(&written).await?;
                self.log(scope, &written, outcome, object, Some(&mapped), None)
                    .await?;
                Ok(Reconciled::new(outcome, written.target_id))
            }
            Err(e) if e.aborts_run() => Err(e),
            Err(e) => {
                warn!("Writing object {} to the target failed: {}", origin_id, e);
                contract.record_failure(Utc::now());
                self.store.save_contract(&contract).await?;
                self.log(scope, &contract, ObjectOutcome::Invalid, object, Some(&mapped), Some(&e))
                    .await?;
                Ok(Reconciled::new(ObjectOutcome::Invalid, previous_target))
            }
        }
    }

    async fn log(
        &self,
        scope: &RunScope<'_>,
        contract: &SynchronizationContract,
        outcome: ObjectOutcome,
        source_object: &Value,
        target_object: Option<&Value>,
        error: Option<&SyncError>,
    ) -> Result<()> {
        let mut log = scope.target.contract_log(contract, outcome.log_result());
        if !scope.persist {
            // The contract only exists in memory during test runs
            log.contract_id = None;
        }
        log.source_object = Some(source_object.clone());
        log.target_object = target_object.cloned();
        log.error = error.map(ToString::to_string);
        self.store.insert_contract_log(&log).await
    }
}
