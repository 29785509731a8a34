//! Internal object store used by the `object-store` target

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::repository::objects;
use crate::error::{Result, SyncError};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upsert an object; an `id` is assigned when missing. Returns the stored object.
    async fn save_object(&self, collection: &str, kind: &str, object: Value) -> Result<Value>;
    /// Delete by id; a missing object is `NotFound`
    async fn delete_object(&self, collection: &str, kind: &str, id: &str) -> Result<()>;
    async fn find_object(&self, collection: &str, kind: &str, id: &str) -> Result<Option<Value>>;
    async fn list_objects(&self, collection: &str, kind: &str) -> Result<Vec<Value>>;
}

/// Ensure the object carries a string `id`, minting one when absent
fn assign_id(mut object: Value) -> Result<(String, Value)> {
    let map = object
        .as_object_mut()
        .ok_or_else(|| SyncError::TargetWrite("object store only accepts JSON objects".into()))?;

    let id = match map.get("id") {
        Some(Value::String(id)) if !id.is_empty() => id.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            let id = Uuid::new_v4().to_string();
            map.insert("id".into(), Value::String(id.clone()));
            id
        }
    };
    Ok((id, object))
}

fn object_not_found(collection: &str, kind: &str, id: &str) -> SyncError {
    SyncError::not_found("object", format!("{collection}/{kind}/{id}"))
}

/// Object store persisted in the `objects` table
#[derive(Debug, Clone)]
pub struct SqliteObjectStore {
    pool: SqlitePool,
}

impl SqliteObjectStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ObjectStore for SqliteObjectStore {
    async fn save_object(&self, collection: &str, kind: &str, object: Value) -> Result<Value> {
        let (id, object) = assign_id(object)?;
        objects::upsert_object(&self.pool, collection, kind, &id, &object).await?;
        Ok(object)
    }

    async fn delete_object(&self, collection: &str, kind: &str, id: &str) -> Result<()> {
        if objects::delete_object(&self.pool, collection, kind, id).await? {
            Ok(())
        } else {
            Err(object_not_found(collection, kind, id))
        }
    }

    async fn find_object(&self, collection: &str, kind: &str, id: &str) -> Result<Option<Value>> {
        Ok(objects::get_object(&self.pool, collection, kind, id).await?)
    }

    async fn list_objects(&self, collection: &str, kind: &str) -> Result<Vec<Value>> {
        Ok(objects::list_objects(&self.pool, collection, kind).await?)
    }
}

type ObjectKey = (String, String, String);

/// In-process object store
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<ObjectKey, Value>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

fn key(collection: &str, kind: &str, id: &str) -> ObjectKey {
    (collection.to_string(), kind.to_string(), id.to_string())
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn save_object(&self, collection: &str, kind: &str, object: Value) -> Result<Value> {
        let (id, object) = assign_id(object)?;
        self.objects
            .write()
            .await
            .insert(key(collection, kind, &id), object.clone());
        Ok(object)
    }

    async fn delete_object(&self, collection: &str, kind: &str, id: &str) -> Result<()> {
        self.objects
            .write()
            .await
            .remove(&key(collection, kind, id))
            .map(|_| ())
            .ok_or_else(|| object_not_found(collection, kind, id))
    }

    async fn find_object(&self, collection: &str, kind: &str, id: &str) -> Result<Option<Value>> {
        Ok(self
            .objects
            .read()
            .await
            .get(&key(collection, kind, id))
            .cloned())
    }

    async fn list_objects(&self, collection: &str, kind: &str) -> Result<Vec<Value>> {
        Ok(self
            .objects
            .read()
            .await
            .iter()
            .filter(|((c, k, _), _)| c == collection && k == kind)
            .map(|(_, object)| object.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::repository::connect;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_assigns_ids() {
        let store = MemoryObjectStore::new();
        let saved = store
            .save_object("crm", "person", json!({"name": "Ada"}))
            .await
            .unwrap();
        let id = saved["id"].as_str().unwrap().to_string();

        let again = store
            .save_object("crm", "person", json!({"id": id, "name": "Ada L."}))
            .await
            .unwrap();
        assert_eq!(again["id"], json!(id));
        assert_eq!(store.len().await, 1);

        store.delete_object("crm", "person", &id).await.unwrap();
        let err = store.delete_object("crm", "person", &id).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_sqlite_store_round_trip() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let store = SqliteObjectStore::new(pool);

        let saved = store
            .save_object("crm", "person", json!({"id": "p1", "name": "Ada"}))
            .await
            .unwrap();
        assert_eq!(saved["id"], json!("p1"));

        let found = store.find_object("crm", "person", "p1").await.unwrap();
        assert_eq!(found, Some(json!({"id": "p1", "name": "Ada"})));
        assert_eq!(store.list_objects("crm", "person").await.unwrap().len(), 1);

        store.delete_object("crm", "person", "p1").await.unwrap();
        assert!(store.delete_object("crm", "person", "p1").await.is_err());
    }

    #[tokio::test]
    async fn test_non_object_is_rejected() {
        let store = MemoryObjectStore::new();
        assert!(store.save_object("crm", "person", json!([1])).await.is_err());
    }
}
