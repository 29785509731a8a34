//! XML → JSON conversion
//!
//! Child elements are keyed by local name and collapse into an array only when
//! a tag repeats. Attributes live under `@attributes` (namespaced ones as
//! `prefix:name`); text next to children or attributes lives under `#text`.

use roxmltree::{Document, Node};
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};

pub const ATTRIBUTES_KEY: &str = "@attributes";
pub const TEXT_KEY: &str = "#text";

/// Parse a document and convert its root element's content
pub fn xml_to_json(text: &str) -> Result<Value> {
    let doc = parse(text)?;
    Ok(element_to_value(doc.root_element()))
}

pub fn parse(text: &str) -> Result<Document<'_>> {
    Document::parse(text).map_err(|e| SyncError::Xml(e.to_string()))
}

/// Convert one element (not including its own name)
pub fn element_to_value(node: Node<'_, '_>) -> Value {
    let mut map = Map::new();

    let attributes = attributes_of(node);
    if !attributes.is_empty() {
        map.insert(ATTRIBUTES_KEY.to_string(), Value::Object(attributes));
    }

    let mut text = String::new();
    let mut has_children = false;
    for child in node.children() {
        if child.is_element() {
            has_children = true;
            let name = child.tag_name().name().to_string();
            let value = element_to_value(child);
            match map.get_mut(&name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    map.insert(name, value);
                }
            }
        } else if child.is_text() {
            if let Some(t) = child.text() {
                text.push_str(t);
            }
        }
    }

    let text = text.trim();
    if map.is_empty() && !has_children {
        return if text.is_empty() {
            Value::Null
        } else {
            Value::String(text.to_string())
        };
    }
    if !text.is_empty() {
        map.insert(TEXT_KEY.to_string(), Value::String(text.to_string()));
    }
    Value::Object(map)
}

fn attributes_of(node: Node<'_, '_>) -> Map<String, Value> {
    node.attributes()
        .map(|attr| {
            let name = match attr.namespace().and_then(|ns| node.lookup_prefix(ns)) {
                Some(prefix) if !prefix.is_empty() => format!("{prefix}:{}", attr.name()),
                _ => attr.name().to_string(),
            };
            (name, Value::String(attr.value().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_repeated_children_collapse_into_arrays() {
        let value = xml_to_json(
            r#"<catalog>
                 <book><title>A</title></book>
                 <book><title>B</title></book>
                 <owner>Library</owner>
               </catalog>"#,
        )
        .unwrap();

        assert_eq!(
            value,
            json!({
                "book": [{"title": "A"}, {"title": "B"}],
                "owner": "Library"
            })
        );
    }

    #[test]
    fn test_single_child_stays_an_object() {
        let value = xml_to_json("<list><item><id>1</id></item></list>").unwrap();
        assert_eq!(value, json!({"item": {"id": "1"}}));
    }

    #[test]
    fn test_attributes_and_mixed_text() {
        let value = xml_to_json(
            r#"<root xmlns:xlink="http://www.w3.org/1999/xlink">
                 <link xlink:href="/a" rel="self">Home</link>
                 <empty/>
               </root>"#,
        )
        .unwrap();

        assert_eq!(
            value,
            json!({
                "link": {
                    "@attributes": {"xlink:href": "/a", "rel": "self"},
                    "#text": "Home"
                },
                "empty": null
            })
        );
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        assert!(matches!(xml_to_json("<open>"), Err(SyncError::Xml(_))));
    }
}
