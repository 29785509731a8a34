//! Generic REST API target
//!
//! The synchronization's `target_id` names a source record describing the
//! remote API (location, default headers, rate-limit state).

use chrono::Utc;
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::api::client::{HttpCaller, strip_location};
use crate::api::operations::Operation;
use crate::error::{Result, SyncError};
use crate::sync::hash::content_hash;
use crate::sync::mapping::{normalize_dotted_keys, resolve_id};
use crate::sync::store::SyncStore;
use crate::sync::types::{Synchronization, SynchronizationContract, TargetAction};

use super::WriteAction;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiTargetConfig {
    pub endpoint: Option<String>,
    pub create_endpoint: Option<String>,
    pub update_endpoint: Option<String>,
    pub delete_endpoint: Option<String>,
    /// Dotted path to the new identity in a create response
    pub id_field: Option<String>,
}

impl ApiTargetConfig {
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(normalize_dotted_keys(value))
            .map_err(|e| SyncError::invalid_config(format!("invalid API target config: {e}")))
    }

    /// Endpoint for `action`, relative to the remote location
    pub fn endpoint_for(&self, action: TargetAction, location: &str) -> Result<String> {
        let specific = match action {
            TargetAction::Create => &self.create_endpoint,
            TargetAction::Update => &self.update_endpoint,
            TargetAction::Delete => &self.delete_endpoint,
        };
        specific
            .as_deref()
            .or(self.endpoint.as_deref())
            .filter(|e| !e.is_empty())
            .map(|e| strip_location(location, e))
            .ok_or_else(|| {
                SyncError::invalid_config(format!(
                    "API target has no endpoint for {}",
                    action.as_str()
                ))
            })
    }

    pub fn id_field(&self) -> &str {
        self.id_field
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or("id")
    }
}

pub(super) async fn write(
    http: &dyn HttpCaller,
    store: &dyn SyncStore,
    mut contract: SynchronizationContract,
    synchronization: &Synchronization,
    target_object: &Value,
    action: WriteAction,
) -> Result<SynchronizationContract> {
    let remote_id = Uuid::parse_str(&synchronization.target_id).map_err(|_| {
        SyncError::invalid_config(format!(
            "API target id '{}' is not a source id",
            synchronization.target_id
        ))
    })?;
    let mut remote = store
        .find_source(remote_id)
        .await?
        .ok_or_else(|| SyncError::not_found("source", remote_id))?;
    let config = ApiTargetConfig::from_value(&synchronization.target_config)?;

    let operation = match (action, contract.target_id.clone()) {
        (WriteAction::Save, None) => Operation::create(
            config.endpoint_for(TargetAction::Create, &remote.location)?,
            target_object.clone(),
        ),
        (WriteAction::Save, Some(id)) => Operation::update(
            config.endpoint_for(TargetAction::Update, &remote.location)?,
            id,
            target_object.clone(),
        ),
        (WriteAction::Delete, Some(id)) => Operation::delete(
            config.endpoint_for(TargetAction::Delete, &remote.location)?,
            id,
        ),
        (WriteAction::Delete, None) => return Ok(contract),
    };

    remote.rate_limit.guard(&remote.name, Utc::now())?;
    debug!(
        "{} {} on '{}'",
        operation.http_method(),
        operation.path(),
        remote.name
    );
    let result = operation.execute(http, &remote).await?;
    let now = Utc::now();

    if result.status_code == Some(429) {
        remote.rate_limit.mark_refused(&result.headers, now);
        remote.updated = now;
        store.save_source(&remote).await?;
        return Err(remote.rate_limit.exceeded(&remote.name, now));
    }
    if remote.rate_limit.update_from_headers(&result.headers, now) {
        remote.updated = now;
        store.save_source(&remote).await?;
    }

    match &operation {
        Operation::Create { .. } => {
            let data = result.into_result().map_err(SyncError::TargetWrite)?;
            let id = resolve_id(&data, config.id_field()).ok_or_else(|| {
                SyncError::TargetWrite(format!(
                    "create response carried no identifier at '{}'",
                    config.id_field()
                ))
            })?;
            contract.target_id = Some(id);
            contract.target_hash = Some(content_hash(target_object));
            contract.target_last_action = Some(TargetAction::Create);
        }
        Operation::Update { .. } => {
            result.into_result().map_err(SyncError::TargetWrite)?;
            contract.target_hash = Some(content_hash(target_object));
            contract.target_last_action = Some(TargetAction::Update);
        }
        Operation::Delete { .. } => {
            // Already gone counts as deleted
            if result.status_code != Some(404) {
                result.into_result().map_err(SyncError::TargetWrite)?;
            }
            contract.target_id = None;
            contract.target_hash = None;
            contract.target_last_action = Some(TargetAction::Delete);
        }
    }

    contract.updated = now;
    Ok(contract)
}
