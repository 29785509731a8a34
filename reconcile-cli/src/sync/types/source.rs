//! Source: a remote system objects are read from (or written to, for API targets)

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::api::client::scalar_to_string;
use crate::api::rate_limit::RateLimitState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    /// `json`, `api`, `rest`, `xml` or `soap`
    #[serde(rename = "type", alias = "sourceType")]
    pub source_type: String,
    /// Base URL every endpoint is resolved against
    pub location: String,
    /// Default `headers` and `query` sent with every call
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub rate_limit: RateLimitState,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated: DateTime<Utc>,
}

impl Source {
    pub fn new(
        name: impl Into<String>,
        source_type: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source_type: source_type.into(),
            location: location.into(),
            config: Value::Null,
            rate_limit: RateLimitState::default(),
            created: now,
            updated: now,
        }
    }

    /// Headers from `config.headers`
    pub fn default_headers(&self) -> BTreeMap<String, String> {
        self.config_pairs("headers").into_iter().collect()
    }

    /// Query parameters from `config.query`
    pub fn default_query(&self) -> Vec<(String, String)> {
        self.config_pairs("query")
    }

    fn config_pairs(&self, key: &str) -> Vec<(String, String)> {
        self.config
            .get(key)
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (k.clone(), scalar_to_string(v)))
                    .collect()
            })
            .unwrap_or_default()
    }
}
