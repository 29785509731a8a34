//! Synchronization: the configuration tying a source to a target

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Synchronization {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub source_id: Uuid,
    pub source_type: String,
    /// Endpoint, `resultsPosition`, `idPosition`, pagination and SOAP settings
    #[serde(default)]
    pub source_config: Value,
    /// `<collection>/<kind>` for the object store, a source id for API targets
    pub target_id: String,
    pub target_type: String,
    #[serde(default)]
    pub target_config: Value,
    #[serde(default)]
    pub mapping_id: Option<Uuid>,
    /// Dotted path → expected value; objects not matching are skipped
    #[serde(default)]
    pub conditions: Option<Value>,
    /// Synchronizations triggered after a successful run
    #[serde(default)]
    pub follow_ups: Vec<Uuid>,
    /// Page cursor, 1-based
    #[serde(default = "first_page")]
    pub current_page: u32,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated: DateTime<Utc>,
}

fn first_page() -> u32 {
    1
}

impl Synchronization {
    pub fn new(
        name: impl Into<String>,
        source_id: Uuid,
        source_type: impl Into<String>,
        target_type: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source_id,
            source_type: source_type.into(),
            source_config: Value::Null,
            target_id: target_id.into(),
            target_type: target_type.into(),
            target_config: Value::Null,
            mapping_id: None,
            conditions: None,
            follow_ups: Vec::new(),
            current_page: 1,
            created: now,
            updated: now,
        }
    }

    pub fn with_source_config(mut self, config: Value) -> Self {
        self.source_config = config;
        self
    }

    pub fn with_target_config(mut self, config: Value) -> Self {
        self.target_config = config;
        self
    }

    pub fn with_mapping(mut self, mapping_id: Uuid) -> Self {
        self.mapping_id = Some(mapping_id);
        self
    }

    pub fn with_conditions(mut self, conditions: Value) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn with_follow_up(mut self, id: Uuid) -> Self {
        self.follow_ups.push(id);
        self
    }
}
