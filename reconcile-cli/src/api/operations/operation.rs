//! Core operation types for writes against a remote API target

use std::collections::BTreeMap;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::client::{CallConfig, HttpCaller};
use crate::error::Result;
use crate::sync::types::Source;

/// A single write against a remote collection endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Create a new record
    Create {
        /// Collection endpoint, relative to the remote source location
        endpoint: String,
        /// Record data as JSON
        data: Value,
    },
    /// Replace an existing record
    Update {
        endpoint: String,
        /// Remote identifier
        id: String,
        data: Value,
    },
    /// Delete a record
    Delete { endpoint: String, id: String },
}

/// Result of executing an Operation
#[derive(Debug, Clone)]
pub struct OperationResult {
    /// The operation that was executed
    pub operation: Operation,
    /// Whether the remote accepted the operation
    pub success: bool,
    /// Parsed response body, if any
    pub data: Option<Value>,
    /// Error message if the operation failed
    pub error: Option<String>,
    pub status_code: Option<u16>,
    pub headers: BTreeMap<String, String>,
}

impl Operation {
    pub fn create(endpoint: impl Into<String>, data: Value) -> Self {
        Self::Create {
            endpoint: endpoint.into(),
            data,
        }
    }

    pub fn update(endpoint: impl Into<String>, id: impl Into<String>, data: Value) -> Self {
        Self::Update {
            endpoint: endpoint.into(),
            id: id.into(),
            data,
        }
    }

    pub fn delete(endpoint: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Delete {
            endpoint: endpoint.into(),
            id: id.into(),
        }
    }

    /// Request path: the collection for creates, `collection/{id}` otherwise
    pub fn path(&self) -> String {
        match self {
            Self::Create { endpoint, .. } => endpoint.clone(),
            Self::Update { endpoint, id, .. } | Self::Delete { endpoint, id } => {
                format!(
                    "{}/{}",
                    endpoint.trim_end_matches('/'),
                    urlencoding::encode(id)
                )
            }
        }
    }

    /// Get the HTTP method for this operation
    pub fn http_method(&self) -> Method {
        match self {
            Self::Create { .. } => Method::POST,
            Self::Update { .. } => Method::PUT,
            Self::Delete { .. } => Method::DELETE,
        }
    }

    /// Get the operation type as a string
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Create { data, .. } | Self::Update { data, .. } => Some(data),
            Self::Delete { .. } => None,
        }
    }

    /// Execute this operation against the remote source
    ///
    /// Transport failures are errors; HTTP refusals come back as an
    /// unsuccessful [`OperationResult`] so callers can inspect the status.
    pub async fn execute(&self, http: &dyn HttpCaller, remote: &Source) -> Result<OperationResult> {
        let mut config = CallConfig::new().with_header("Accept", "application/json");
        if let Some(data) = self.data() {
            config = config.with_json(data.clone());
        }

        let response = http
            .call(remote, &self.path(), self.http_method(), &config)
            .await?;

        let data = response.json().ok().filter(|v| !v.is_null());
        let mut result = if response.is_success() {
            OperationResult::success(self.clone(), data)
        } else {
            let message = if response.body.trim().is_empty() {
                format!("HTTP {}", response.status)
            } else {
                format!("HTTP {}: {}", response.status, response.body.trim())
            };
            OperationResult::error(self.clone(), message, Some(response.status))
        };
        result.status_code = Some(response.status);
        result.headers = response.headers;
        Ok(result)
    }
}

impl OperationResult {
    /// Create a new successful result
    pub fn success(operation: Operation, data: Option<Value>) -> Self {
        Self {
            operation,
            success: true,
            data,
            error: None,
            status_code: Some(200),
            headers: BTreeMap::new(),
        }
    }

    /// Create a new error result
    pub fn error(operation: Operation, error: String, status_code: Option<u16>) -> Self {
        Self {
            operation,
            success: false,
            data: None,
            error: Some(error),
            status_code,
            headers: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Get the result data, returning the error message if the operation failed
    pub fn into_result(self) -> std::result::Result<Value, String> {
        if self.success {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(self.error.unwrap_or_else(|| "Unknown error".to_string()))
        }
    }
}
