//! Mapping collaborator: reshapes a source object into its target form

pub mod path;

use serde_json::{Map, Value};

use crate::error::{Result, SyncError};
use crate::sync::types::Mapping;

pub use path::{normalize_dotted_keys, remove_path, resolve_id, resolve_path, set_path};

/// Applies a [`Mapping`] to a source object
pub trait MappingService: Send + Sync {
    fn apply_mapping(&self, mapping: &Mapping, object: &Value) -> Result<Value>;
}

/// Default mapper driven by dotted paths
///
/// Each entry copies the value at the source path to the target path. Values
/// prefixed with `=` are literals, parsed as JSON when possible. Source paths
/// that do not resolve leave the target field unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathMapper;

impl MappingService for PathMapper {
    fn apply_mapping(&self, mapping: &Mapping, object: &Value) -> Result<Value> {
        if !object.is_object() {
            return Err(SyncError::Mapping(format!(
                "mapping '{}' expects an object, got {}",
                mapping.name,
                type_name(object)
            )));
        }

        let mut result = if mapping.pass_through {
            object.clone()
        } else {
            Value::Object(Map::new())
        };

        for (target, source) in &mapping.mapping {
            if let Some(literal) = source.strip_prefix('=') {
                let value = serde_json::from_str(literal)
                    .unwrap_or_else(|_| Value::String(literal.to_string()));
                set_path(&mut result, target, value);
            } else if let Some(value) = resolve_path(object, source) {
                set_path(&mut result, target, value.clone());
            }
        }

        for field in &mapping.unset {
            remove_path(&mut result, field);
        }

        Ok(result)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
