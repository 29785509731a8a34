//! Mapping: declarative reshaping of a source object into a target object

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Target field (dotted) → source path (dotted), or a literal when prefixed with `=`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
    /// Fields removed from the result after mapping
    #[serde(default)]
    pub unset: Vec<String>,
    /// Start from a copy of the source object instead of an empty one
    #[serde(default)]
    pub pass_through: bool,
}

impl Mapping {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn field(mut self, target: impl Into<String>, source: impl Into<String>) -> Self {
        self.mapping.insert(target.into(), source.into());
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.unset.push(field.into());
        self
    }

    pub fn pass_through(mut self, enabled: bool) -> Self {
        self.pass_through = enabled;
        self
    }
}
