//! Nested objects with their own origin identity
//!
//! A target entity can embed objects (order lines, addresses) that the source
//! identifies independently. Their ids are rewritten to the identities
//! recorded in earlier runs, and after the save each one gets a child
//! contract of its own.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::sync::mapping::{normalize_dotted_keys, resolve_path, set_path};

const DEFAULT_ORIGIN_ID_FIELD: &str = "originId";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubObjectConfig {
    /// Dotted paths of fields holding sub-objects
    pub sub_objects: Vec<String>,
    pub origin_id_field: Option<String>,
}

impl SubObjectConfig {
    pub fn from_target_config(value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(normalize_dotted_keys(value))
            .map_err(|e| SyncError::invalid_config(format!("invalid sub-object config: {e}")))
    }

    pub fn is_empty(&self) -> bool {
        self.sub_objects.is_empty()
    }

    pub fn origin_id_field(&self) -> &str {
        self.origin_id_field
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_ORIGIN_ID_FIELD)
    }
}

/// A nested object carrying an origin id
#[derive(Debug, Clone, PartialEq)]
pub struct SubObject {
    /// Contract origin id: `<field>/<origin id>`
    pub key: String,
    pub target_id: Option<String>,
    pub object: Value,
}

/// Origin key of a sub-object; scoped by field so it cannot collide with
/// top-level origin ids of the same synchronization
pub fn contract_key(field: &str, origin_id: &str) -> String {
    format!("{field}/{origin_id}")
}

fn origin_id(map: &Map<String, Value>, field: &str) -> Option<String> {
    match map.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// All sub-objects of `entity`, depth first
pub fn collect_sub_objects(entity: &Value, config: &SubObjectConfig) -> Vec<SubObject> {
    let mut found = Vec::new();
    for field in &config.sub_objects {
        if let Some(value) = resolve_path(entity, field) {
            collect(value, field, config.origin_id_field(), &mut found);
        }
    }
    found
}

fn collect(value: &Value, field: &str, origin_field: &str, found: &mut Vec<SubObject>) {
    match value {
        Value::Object(map) => {
            if let Some(origin) = origin_id(map, origin_field) {
                found.push(SubObject {
                    key: contract_key(field, &origin),
                    target_id: match map.get("id") {
                        Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
                        Some(Value::Number(n)) => Some(n.to_string()),
                        _ => None,
                    },
                    object: value.clone(),
                });
            }
            for child in map.values() {
                collect(child, field, origin_field, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect(item, field, origin_field, found);
            }
        }
        _ => {}
    }
}

/// Return a copy of `entity` with every sub-object's `id` set from `lookup`
/// (contract key → target id), minting a UUID for sub-objects seen first
pub fn rewrite_sub_objects(
    entity: &Value,
    config: &SubObjectConfig,
    lookup: &HashMap<String, String>,
) -> Value {
    let mut result = entity.clone();
    for field in &config.sub_objects {
        if let Some(value) = resolve_path(entity, field) {
            let rewritten = rewrite(value, field, config.origin_id_field(), lookup);
            set_path(&mut result, field, rewritten);
        }
    }
    result
}

fn rewrite(value: &Value, field: &str, origin_field: &str, lookup: &HashMap<String, String>) -> Value {
    match value {
        Value::Object(map) => {
            let mut out: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), rewrite(v, field, origin_field, lookup)))
                .collect();
            if let Some(origin) = origin_id(map, origin_field) {
                let id = lookup
                    .get(&contract_key(field, &origin))
                    .cloned()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                out.insert("id".to_string(), Value::String(id));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| rewrite(item, field, origin_field, lookup))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> SubObjectConfig {
        SubObjectConfig::from_target_config(&json!({"subObjects": ["lines", "billing"]})).unwrap()
    }

    fn order() -> Value {
        json!({
            "number": "SO-1",
            "lines": [
                {"originId": "L1", "qty": 1},
                {"originId": "L2", "qty": 2, "product": {"originId": 9}}
            ],
            "billing": {"main": {"originId": "A1", "city": "Ghent"}},
            "notes": {"originId": "ignored"}
        })
    }

    #[test]
    fn test_collect_through_lists_and_keyed_objects() {
        let keys: Vec<String> = collect_sub_objects(&order(), &config())
            .into_iter()
            .map(|s| s.key)
            .collect();
        assert_eq!(keys, vec!["lines/L1", "lines/L2", "lines/9", "billing/A1"]);
    }

    #[test]
    fn test_rewrite_uses_lookup_and_mints_missing() {
        let lookup = HashMap::from([("lines/L1".to_string(), "t-1".to_string())]);
        let original = order();
        let rewritten = rewrite_sub_objects(&original, &config(), &lookup);

        assert_eq!(rewritten["lines"][0]["id"], json!("t-1"));
        let minted = rewritten["lines"][1]["id"].as_str().unwrap();
        assert!(Uuid::parse_str(minted).is_ok());
        assert!(rewritten["billing"]["main"]["id"].is_string());
        // Fields outside subObjects are untouched, as is the input
        assert!(rewritten["notes"].get("id").is_none());
        assert!(original["lines"][0].get("id").is_none());
    }

    #[test]
    fn test_custom_origin_field() {
        let config = SubObjectConfig::from_target_config(&json!({
            "subObjects": ["lines"],
            "originIdField": "sourceKey"
        }))
        .unwrap();
        let found = collect_sub_objects(
            &json!({"lines": [{"sourceKey": "x", "id": "t-x"}, {"originId": "y"}]}),
            &config,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].target_id.as_deref(), Some("t-x"));
    }

    #[test]
    fn test_empty_config() {
        assert!(SubObjectConfig::from_target_config(&Value::Null).unwrap().is_empty());
        assert_eq!(SubObjectConfig::default().origin_id_field(), "originId");
    }
}
