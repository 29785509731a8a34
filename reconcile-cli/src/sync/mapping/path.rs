//! Dotted path resolution over JSON values
//!
//! Paths look like `customer.address.city` or `lines.0.amount`: numeric
//! segments index into arrays, other segments into objects.

use serde_json::{Map, Value};

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

/// Resolve a dotted path, returning `None` when any segment is missing
///
/// Object keys match exactly first, then case-insensitively.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    let mut any = false;

    for segment in segments(path) {
        any = true;
        current = match current {
            Value::Object(map) => map
                .get(segment)
                .or_else(|| find_case_insensitive(map, segment))?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    any.then_some(current)
}

/// Find a key in a JSON object using case-insensitive matching
fn find_case_insensitive<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let key_lower = key.to_lowercase();
    map.iter()
        .find(|(k, _)| k.to_lowercase() == key_lower)
        .map(|(_, v)| v)
}

/// Resolve a path to a non-empty identifier string
///
/// Strings are returned as-is, numbers are rendered; anything else is `None`.
pub fn resolve_id(value: &Value, path: &str) -> Option<String> {
    match resolve_path(value, path)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Write `new_value` at `path`, creating intermediate objects as needed
///
/// Existing non-object intermediates are replaced by objects.
pub fn set_path(value: &mut Value, path: &str, new_value: Value) {
    let parts: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut current = value;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(last.to_string(), new_value);
    }
}

/// Remove the value at `path`; returns it when something was removed
pub fn remove_path(value: &mut Value, path: &str) -> Option<Value> {
    let parts: Vec<&str> = segments(path).collect();
    let (last, parents) = parts.split_last()?;

    let mut current = value;
    for segment in parents {
        current = match current {
            Value::Object(map) => map.get_mut(*segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    match current {
        Value::Object(map) => map.remove(*last),
        Value::Array(items) => {
            let index = last.parse::<usize>().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}

/// Expand top-level dotted keys into nested objects
///
/// `{"query.limit": 10}` becomes `{"query": {"limit": 10}}`. Plain keys win
/// over dotted ones when both address the same leaf.
pub fn normalize_dotted_keys(value: &Value) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };

    let mut result = Value::Object(Map::new());
    for (key, item) in map.iter().filter(|(k, _)| k.contains('.')) {
        set_path(&mut result, key, item.clone());
    }
    for (key, item) in map.iter().filter(|(k, _)| !k.contains('.')) {
        let merged = match (result.get_mut(key.as_str()), item) {
            (Some(Value::Object(existing)), Value::Object(plain)) => {
                for (k, v) in plain {
                    existing.insert(k.clone(), v.clone());
                }
                true
            }
            _ => false,
        };
        if !merged {
            set_path(&mut result, key, item.clone());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_simple_and_nested() {
        let record = json!({
            "name": "Contoso",
            "address": {"city": "Ghent"},
            "lines": [{"amount": 5}, {"amount": 7}]
        });

        assert_eq!(resolve_path(&record, "name"), Some(&json!("Contoso")));
        assert_eq!(resolve_path(&record, "address.city"), Some(&json!("Ghent")));
        assert_eq!(resolve_path(&record, "lines.1.amount"), Some(&json!(7)));
        assert_eq!(resolve_path(&record, "lines.9.amount"), None);
        assert_eq!(resolve_path(&record, "missing.city"), None);
        assert_eq!(resolve_path(&record, ""), None);
    }

    #[test]
    fn test_resolve_case_insensitive_fallback() {
        let record = json!({"Address": {"City": "Ghent"}});
        assert_eq!(resolve_path(&record, "address.city"), Some(&json!("Ghent")));
    }

    #[test]
    fn test_resolve_null_at_second_level() {
        let record = json!({"user": {"contact": null}});
        assert_eq!(resolve_path(&record, "user.contact.email"), None);
    }

    #[test]
    fn test_resolve_id() {
        let record = json!({"id": 42, "meta": {"uuid": "abc"}, "empty": ""});
        assert_eq!(resolve_id(&record, "id"), Some("42".to_string()));
        assert_eq!(resolve_id(&record, "meta.uuid"), Some("abc".to_string()));
        assert_eq!(resolve_id(&record, "empty"), None);
        assert_eq!(resolve_id(&record, "meta"), None);
    }

    #[test]
    fn test_set_path_creates_intermediates() {
        let mut value = json!({"a": 1});
        set_path(&mut value, "b.c.d", json!(true));
        set_path(&mut value, "a.x", json!("replaced"));
        assert_eq!(value, json!({"a": {"x": "replaced"}, "b": {"c": {"d": true}}}));
    }

    #[test]
    fn test_remove_path() {
        let mut value = json!({"a": {"b": 1, "c": 2}, "list": [1, 2, 3]});
        assert_eq!(remove_path(&mut value, "a.b"), Some(json!(1)));
        assert_eq!(remove_path(&mut value, "list.1"), Some(json!(2)));
        assert_eq!(remove_path(&mut value, "a.missing"), None);
        assert_eq!(value, json!({"a": {"c": 2}, "list": [1, 3]}));
    }

    #[test]
    fn test_normalize_dotted_keys() {
        let config = json!({
            "endpoint": "/people",
            "query.limit": 10,
            "query": {"sort": "name"},
            "headers.X-Key": "abc"
        });
        assert_eq!(
            normalize_dotted_keys(&config),
            json!({
                "endpoint": "/people",
                "query": {"limit": 10, "sort": "name"},
                "headers": {"X-Key": "abc"}
            })
        );
    }
}
