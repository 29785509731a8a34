//! Locating the object list inside a response body

use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::sync::mapping::resolve_path;

/// Body is the list itself
pub const ROOT_POSITION: &str = "_root";
/// Alias of [`ROOT_POSITION`]
pub const OBJECT_POSITION: &str = "_object";
/// Container keys probed, in order, when no position is configured
pub const PROBED_KEYS: [&str; 3] = ["items", "result", "results"];

/// Extract the objects of one page
///
/// A single object where a list is expected counts as a one-element list (XML
/// only produces arrays for repeated tags); `null` counts as an empty list.
pub fn extract_objects(body: &Value, results_position: Option<&str>) -> Result<Vec<Value>> {
    match results_position.filter(|p| !p.is_empty()) {
        Some(ROOT_POSITION | OBJECT_POSITION) => match body {
            Value::Array(items) => Ok(items.clone()),
            Value::Object(_) => Ok(vec![body.clone()]),
            Value::Null => Ok(Vec::new()),
            _ => Err(SyncError::Extraction("response body is not a list".into())),
        },
        Some(position) => {
            let found = resolve_path(body, position).ok_or_else(|| {
                SyncError::Extraction(format!("results position '{position}' not found"))
            })?;
            as_list(found).ok_or_else(|| {
                SyncError::Extraction(format!("results position '{position}' is not a list"))
            })
        }
        None => {
            if let Value::Array(items) = body {
                return Ok(items.clone());
            }
            PROBED_KEYS
                .iter()
                .find_map(|key| body.get(*key).and_then(as_list))
                .ok_or_else(|| {
                    SyncError::Extraction(format!(
                        "no object list found (looked for {})",
                        PROBED_KEYS.join(", ")
                    ))
                })
        }
    }
}

fn as_list(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::Object(_) => Some(vec![value.clone()]),
        Value::Null => Some(Vec::new()),
        _ => None,
    }
}
