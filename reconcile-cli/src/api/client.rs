//! HTTP transport shared by source connectors and the API target
//!
//! Connectors never talk to `reqwest` directly: they go through [`HttpCaller`],
//! which lets tests swap in scripted responses and keeps URL joining, default
//! headers and timeouts in one place.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Method;
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::sync::types::Source;

/// Raw response handed back to connectors
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub headers: BTreeMap<String, String>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON; an empty body is `null`
    pub fn json(&self) -> Result<Value> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Request payload
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Text { content_type: String, body: String },
}

/// Per-call request options, merged on top of the source defaults
#[derive(Debug, Clone, Default)]
pub struct CallConfig {
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl CallConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn with_text(mut self, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text {
            content_type: content_type.into(),
            body: body.into(),
        });
        self
    }

    /// Set a query parameter, replacing any previous value of the same name
    pub fn set_query(&mut self, name: &str, value: impl Into<String>) {
        self.query.retain(|(key, _)| key != name);
        self.query.push((name.to_string(), value.into()));
    }
}

/// Something that can perform an HTTP call against a source
#[async_trait]
pub trait HttpCaller: Send + Sync {
    async fn call(
        &self,
        source: &Source,
        endpoint: &str,
        method: Method,
        config: &CallConfig,
    ) -> Result<HttpResponse>;
}

/// `reqwest`-backed caller
pub struct ReqwestCaller {
    client: reqwest::Client,
}

impl ReqwestCaller {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpCaller for ReqwestCaller {
    async fn call(
        &self,
        source: &Source,
        endpoint: &str,
        method: Method,
        config: &CallConfig,
    ) -> Result<HttpResponse> {
        let url = join_url(&source.location, endpoint);
        debug!("{} {} (source '{}')", method, url, source.name);

        let mut query = source.default_query();
        for (key, value) in &config.query {
            query.retain(|(existing, _)| existing != key);
            query.push((key.clone(), value.clone()));
        }

        let mut request = self.client.request(method, &url).query(&query);

        let mut headers = source.default_headers();
        headers.extend(config.headers.clone());
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }

        request = match &config.body {
            Some(RequestBody::Json(body)) => request.json(body),
            Some(RequestBody::Text { content_type, body }) => request
                .header(reqwest::header::CONTENT_TYPE, content_type.as_str())
                .body(body.clone()),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::SourceFetch(format!("{url}: {e}")))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::SourceFetch(format!("{url}: {e}")))?;

        Ok(HttpResponse {
            status,
            body,
            headers,
        })
    }
}

/// Join a source location and an endpoint; absolute endpoints pass through
pub fn join_url(location: &str, endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    if endpoint.is_empty() {
        return location.to_string();
    }
    format!(
        "{}/{}",
        location.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Make an absolute URL relative to the source location when it lives under it
pub fn strip_location(location: &str, url: &str) -> String {
    let base = location.trim_end_matches('/');
    if !base.is_empty() {
        if let Some(rest) = url.strip_prefix(base) {
            if rest.is_empty() || rest.starts_with('/') || rest.starts_with('?') {
                return rest.to_string();
            }
        }
    }
    url.to_string()
}

/// Render a JSON scalar for use in a header or query string
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
