//! Internal object store target; `target_id` is `<collection>/<kind>`

use std::collections::HashMap;

use chrono::Utc;
use log::debug;
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::sync::hash::content_hash;
use crate::sync::mapping::resolve_id;
use crate::sync::objects::ObjectStore;
use crate::sync::store::SyncStore;
use crate::sync::types::{
    ContractLogResult, Synchronization, SynchronizationContract, TargetAction,
};

use super::sub_objects::{SubObjectConfig, collect_sub_objects, rewrite_sub_objects};
use super::{TargetContext, WriteAction};

/// Split `<collection>/<kind>`
pub fn parse_target(target_id: &str) -> Result<(&str, &str)> {
    target_id
        .split_once('/')
        .filter(|(collection, kind)| !collection.is_empty() && !kind.is_empty())
        .ok_or_else(|| {
            SyncError::invalid_config(format!(
                "object-store target '{target_id}' must look like <collection>/<kind>"
            ))
        })
}

pub(super) async fn write(
    objects: &dyn ObjectStore,
    store: &dyn SyncStore,
    mut contract: SynchronizationContract,
    synchronization: &Synchronization,
    target_object: &Value,
    action: WriteAction,
    ctx: &TargetContext,
) -> Result<SynchronizationContract> {
    let (collection, kind) = parse_target(&synchronization.target_id)?;
    let now = Utc::now();

    if action == WriteAction::Delete {
        if let Some(id) = contract.target_id.as_deref() {
            match objects.delete_object(collection, kind, id).await {
                Ok(()) => {}
                Err(SyncError::NotFound { .. }) => {
                    debug!("{}/{}/{} was already gone", collection, kind, id)
                }
                Err(e) => return Err(e),
            }
        }
        contract.target_id = None;
        contract.target_hash = None;
        contract.target_last_action = Some(TargetAction::Delete);
        contract.updated = now;
        return Ok(contract);
    }

    let config = SubObjectConfig::from_target_config(&synchronization.target_config)?;
    let mut object = if config.is_empty() {
        target_object.clone()
    } else {
        let lookup = sub_object_lookup(store, synchronization, target_object, &config).await?;
        rewrite_sub_objects(target_object, &config, &lookup)
    };

    let creating = contract.target_id.is_none();
    if let (Some(id), Some(map)) = (&contract.target_id, object.as_object_mut()) {
        map.insert("id".to_string(), Value::String(id.clone()));
    }

    let payload_hash = content_hash(&object);
    let saved = objects.save_object(collection, kind, object).await?;
    let target_id = resolve_id(&saved, "id")
        .ok_or_else(|| SyncError::TargetWrite("saved object has no id".into()))?;

    contract.target_id = Some(target_id);
    contract.target_hash = Some(payload_hash);
    contract.target_last_action = Some(if creating {
        TargetAction::Create
    } else {
        TargetAction::Update
    });
    contract.updated = now;

    if !config.is_empty() {
        save_sub_contracts(store, &contract, &saved, &config, ctx).await?;
    }

    Ok(contract)
}

/// Contract key → recorded target id, for every sub-object of `entity`
async fn sub_object_lookup(
    store: &dyn SyncStore,
    synchronization: &Synchronization,
    entity: &Value,
    config: &SubObjectConfig,
) -> Result<HashMap<String, String>> {
    let mut lookup = HashMap::new();
    for sub in collect_sub_objects(entity, config) {
        if lookup.contains_key(&sub.key) {
            continue;
        }
        if let Some(target_id) = store
            .find_contract_by_origin(synchronization.id, &sub.key)
            .await?
            .and_then(|c| c.target_id)
        {
            lookup.insert(sub.key, target_id);
        }
    }
    Ok(lookup)
}

/// Create or refresh a child contract per sub-object of the saved entity
async fn save_sub_contracts(
    store: &dyn SyncStore,
    parent: &SynchronizationContract,
    saved: &Value,
    config: &SubObjectConfig,
    ctx: &TargetContext,
) -> Result<()> {
    let now = Utc::now();

    for sub in collect_sub_objects(saved, config) {
        let existing = store
            .find_contract_by_origin(parent.synchronization_id, &sub.key)
            .await?;
        let hash = content_hash(&sub.object);

        let (mut contract, result) = match existing {
            Some(c) if c.target_id == sub.target_id && c.origin_hash.as_ref() == Some(&hash) => {
                continue;
            }
            Some(c) if c.target_id.is_some() => (c, ContractLogResult::Updated),
            Some(c) => (c, ContractLogResult::Created),
            None => (
                SynchronizationContract::child(parent, sub.key.clone()),
                ContractLogResult::Created,
            ),
        };

        contract.parent_id = Some(parent.id);
        contract.origin_hash = Some(hash.clone());
        contract.target_hash = Some(hash);
        contract.target_id = sub.target_id.clone();
        contract.target_last_action = Some(match result {
            ContractLogResult::Created => TargetAction::Create,
            _ => TargetAction::Update,
        });
        contract.source_last_checked = Some(now);
        contract.target_last_synced = Some(now);
        contract.updated = now;
        store.save_contract(&contract).await?;

        let mut log = ctx.contract_log(&contract, result);
        log.target_object = Some(sub.object);
        store.insert_contract_log(&log).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::objects::MemoryObjectStore;
    use crate::sync::store::MemoryStore;
    use serde_json::json;
    use uuid::Uuid;

    fn order_sync() -> Synchronization {
        Synchronization::new("orders", Uuid::new_v4(), "json", "object-store", "shop/order")
            .with_target_config(json!({"subObjects": ["lines"]}))
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("crm/person").unwrap(), ("crm", "person"));
        assert!(parse_target("crm").is_err());
        assert!(parse_target("/person").is_err());
    }

    #[tokio::test]
    async fn test_save_creates_then_updates() {
        let objects = MemoryObjectStore::new();
        let store = MemoryStore::new();
        let sync = Synchronization::new("s", Uuid::new_v4(), "json", "object-store", "crm/person");
        let ctx = TargetContext::default();

        let contract = write(
            &objects,
            &store,
            SynchronizationContract::new(sync.id, "1"),
            &sync,
            &json!({"name": "Ada"}),
            WriteAction::Save,
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(contract.target_last_action, Some(TargetAction::Create));
        let id = contract.target_id.clone().unwrap();

        let contract = write(&objects, &store, contract, &sync, &json!({"name": "Ada L."}), WriteAction::Save, &ctx)
            .await
            .unwrap();
        assert_eq!(contract.target_id.as_deref(), Some(id.as_str()));
        assert_eq!(contract.target_last_action, Some(TargetAction::Update));
        // Hash of what was written, injected id included
        assert_eq!(
            contract.target_hash,
            Some(content_hash(&json!({"id": id, "name": "Ada L."})))
        );
        assert_ne!(contract.target_hash, Some(content_hash(&json!({"name": "Ada L."}))));
        assert_eq!(
            objects.find_object("crm", "person", &id).await.unwrap(),
            Some(json!({"id": id, "name": "Ada L."}))
        );
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_object() {
        let objects = MemoryObjectStore::new();
        let store = MemoryStore::new();
        let sync = Synchronization::new("s", Uuid::new_v4(), "json", "object-store", "crm/person");
        let mut contract = SynchronizationContract::new(sync.id, "1");
        contract.target_id = Some("gone".into());

        let contract = write(&objects, &store, contract, &sync, &Value::Null, WriteAction::Delete, &TargetContext::default())
            .await
            .unwrap();
        assert_eq!(contract.target_id, None);
        assert_eq!(contract.target_last_action, Some(TargetAction::Delete));
    }

    #[tokio::test]
    async fn test_sub_objects_keep_identity_across_saves() {
        let objects = MemoryObjectStore::new();
        let store = MemoryStore::new();
        let sync = order_sync();
        let ctx = TargetContext {
            retention_days: 7,
            ..Default::default()
        };
        let order = json!({"number": "SO-1", "lines": [{"originId": "L1", "qty": 1}]});

        let parent = write(&objects, &store, SynchronizationContract::new(sync.id, "SO-1"), &sync, &order, WriteAction::Save, &ctx)
            .await
            .unwrap();
        store.save_contract(&parent).await.unwrap();

        let child = store
            .find_contract_by_origin(sync.id, "lines/L1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(child.parent_id, Some(parent.id));
        let line_id = child.target_id.clone().unwrap();

        let changed = json!({"number": "SO-1", "lines": [{"originId": "L1", "qty": 3}]});
        let parent = write(&objects, &store, parent, &sync, &changed, WriteAction::Save, &ctx)
            .await
            .unwrap();

        let stored = objects
            .find_object("shop", "order", parent.target_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["lines"][0]["id"], json!(line_id));
        assert_eq!(stored["lines"][0]["qty"], json!(3));

        let child = store
            .find_contract_by_origin(sync.id, "lines/L1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(child.target_last_action, Some(TargetAction::Update));
        assert_eq!(store.find_contracts_by_synchronization(sync.id).await.unwrap().len(), 2);
    }
}
