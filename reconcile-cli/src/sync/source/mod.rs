//! Source connectors and their registry
//!
//! A connector knows how to shape a request for its format and decode the
//! response; the registry owns everything shared: the rate-limit guard,
//! response status handling, extraction and the pagination loop.

pub mod extract;
pub mod soap;
pub mod xml;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::api::client::{CallConfig, HttpCaller, RequestBody, scalar_to_string, strip_location};
use crate::error::{Result, SyncError};
use crate::sync::mapping::normalize_dotted_keys;
use crate::sync::store::SyncStore;
use crate::sync::types::Source;

pub use extract::extract_objects;
pub use soap::{SoapConfig, SoapVersion};

/// Fetch settings read from a synchronization's `sourceConfig`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceFetchConfig {
    /// Endpoint relative to the source location (absolute URLs allowed)
    pub endpoint: String,
    /// Dotted path to the object list, or `_root` / `_object` for the whole body
    pub results_position: Option<String>,
    /// Dotted path to each object's identifier (default `id`)
    pub id_position: Option<String>,
    /// Query parameter used for page-number pagination
    pub page_parameter: Option<String>,
    pub method: Option<String>,
    pub headers: BTreeMap<String, Value>,
    pub query: BTreeMap<String, Value>,
    pub soap: Option<SoapConfig>,
}

impl SourceFetchConfig {
    /// Parse a config value, expanding dotted keys first; `null` is the default config
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(normalize_dotted_keys(value))
            .map_err(|e| SyncError::invalid_config(format!("invalid source config: {e}")))
    }

    pub fn id_position(&self) -> &str {
        self.id_position
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or("id")
    }

    fn method(&self) -> Result<Method> {
        match self.method.as_deref() {
            None | Some("") => Ok(Method::GET),
            Some(raw) => Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
                .map_err(|_| SyncError::invalid_config(format!("invalid HTTP method '{raw}'"))),
        }
    }

    fn call_config(&self) -> CallConfig {
        CallConfig {
            headers: self
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), scalar_to_string(v)))
                .collect(),
            query: self
                .query
                .iter()
                .map(|(k, v)| (k.clone(), scalar_to_string(v)))
                .collect(),
            body: None,
        }
    }
}

/// One `get_all_objects` invocation
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    /// Synchronization whose page cursor is advanced; `None` leaves cursors alone
    pub synchronization_id: Option<Uuid>,
    pub config: SourceFetchConfig,
    pub is_test: bool,
    /// Page to start from (1-based)
    pub current_page: u32,
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    pub objects: Vec<Value>,
    /// Last page requested
    pub last_page: u32,
    /// Whether fetching started at page 1, i.e. `objects` is the complete set
    pub from_first_page: bool,
}

/// How the source paginates; resolved from the first response of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationMode {
    Unknown,
    /// Follow the `next` link of each page
    Link,
    /// Increment a page query parameter
    Page,
}

impl PaginationMode {
    pub fn infer(body: &Value) -> Self {
        match body {
            Value::Object(map) if map.contains_key("next") => Self::Link,
            _ => Self::Page,
        }
    }
}

/// `next` link of a page, relative to the source location
pub fn next_link(body: &Value, location: &str) -> Option<String> {
    body.get("next")
        .and_then(Value::as_str)
        .filter(|next| !next.trim().is_empty())
        .map(|next| strip_location(location, next.trim()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceConnector {
    JsonApi,
    Xml,
    Soap,
}

impl SourceConnector {
    pub fn can_handle(&self, source_type: &str) -> bool {
        let source_type = source_type.to_ascii_lowercase();
        match self {
            Self::JsonApi => matches!(source_type.as_str(), "json" | "api" | "rest"),
            Self::Xml => source_type == "xml",
            Self::Soap => source_type == "soap",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::JsonApi => "json-api",
            Self::Xml => "xml",
            Self::Soap => "soap",
        }
    }

    fn prepare(&self, config: &SourceFetchConfig, mut call: CallConfig) -> Result<(Method, CallConfig)> {
        match self {
            Self::JsonApi => {
                call.headers
                    .entry("Accept".to_string())
                    .or_insert_with(|| "application/json".to_string());
                Ok((config.method()?, call))
            }
            Self::Xml => {
                call.headers
                    .entry("Accept".to_string())
                    .or_insert_with(|| "application/xml, text/xml".to_string());
                Ok((config.method()?, call))
            }
            Self::Soap => {
                let soap = config.soap.as_ref().ok_or_else(|| {
                    SyncError::invalid_config("SOAP sources need a `soap` section in the source config")
                })?;
                if let Some((name, value)) = soap.action_header() {
                    call.headers.insert(name, value);
                }
                call.body = Some(RequestBody::Text {
                    content_type: soap.content_type(),
                    body: soap::build_envelope(soap)?,
                });
                Ok((Method::POST, call))
            }
        }
    }

    fn decode(&self, body: &str) -> Result<Value> {
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        match self {
            Self::JsonApi => serde_json::from_str(body)
                .map_err(|e| SyncError::SourceFetch(format!("invalid JSON response: {e}"))),
            Self::Xml => xml::xml_to_json(body),
            Self::Soap => soap::unwrap_response(body),
        }
    }
}

/// Ordered connectors; the first one whose `can_handle` matches wins
pub struct SourceRegistry {
    connectors: Vec<SourceConnector>,
    http: Arc<dyn HttpCaller>,
    store: Arc<dyn SyncStore>,
    page_parameter: String,
}

impl SourceRegistry {
    pub fn new(http: Arc<dyn HttpCaller>, store: Arc<dyn SyncStore>) -> Self {
        Self {
            connectors: vec![
                SourceConnector::JsonApi,
                SourceConnector::Xml,
                SourceConnector::Soap,
            ],
            http,
            store,
            page_parameter: "page".to_string(),
        }
    }

    /// Default page parameter when the source config names none
    pub fn with_page_parameter(mut self, name: impl Into<String>) -> Self {
        self.page_parameter = name.into();
        self
    }

    pub fn can_handle(&self, source_type: &str) -> bool {
        self.connectors.iter().any(|c| c.can_handle(source_type))
    }

    pub fn connector_for(&self, source_type: &str) -> Result<SourceConnector> {
        self.connectors
            .iter()
            .copied()
            .find(|c| c.can_handle(source_type))
            .ok_or_else(|| SyncError::UnsupportedSourceType(source_type.to_string()))
    }

    /// Fetch every object, following pagination until it terminates
    ///
    /// In page-number mode the synchronization's page cursor is advanced after
    /// each page and reset to 1 when the last page has been read. Link-based
    /// sources always start from the configured endpoint and never move the
    /// cursor. In test mode only the first object of the first page is
    /// returned and cursors are left alone.
    pub async fn get_all_objects(&self, source: &mut Source, request: FetchRequest) -> Result<FetchOutcome> {
        let connector = self.connector_for(&source.source_type)?;
        let page_parameter = request
            .config
            .page_parameter
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.page_parameter.clone());

        let mut base_call = request.config.call_config();
        base_call.headers.extend(request.headers.clone());
        for (key, value) in &request.query {
            base_call.set_query(key, value.clone());
        }

        let mut start_page = if request.is_test {
            1
        } else {
            request.current_page.max(1)
        };
        let mut page = start_page;
        let mut mode = PaginationMode::Unknown;
        let mut endpoint = request.config.endpoint.clone();
        let mut following_link = false;
        let mut visited = HashSet::from([endpoint.clone()]);
        let mut previous: Option<Vec<Value>> = None;
        let mut objects = Vec::new();

        loop {
            let call = if following_link {
                // The next link carries its own query string
                CallConfig {
                    headers: base_call.headers.clone(),
                    ..CallConfig::default()
                }
            } else {
                let mut call = base_call.clone();
                if page > 1 {
                    call.set_query(&page_parameter, page.to_string());
                }
                call
            };

            let body = self
                .fetch(connector, source, &endpoint, &request.config, call)
                .await?;

            if mode == PaginationMode::Unknown {
                mode = PaginationMode::infer(&body);
                debug!(
                    "Source '{}' uses {:?} pagination ({})",
                    source.name,
                    mode,
                    connector.name()
                );
                // A page cursor means nothing to a link-based source
                if mode == PaginationMode::Link && page > 1 {
                    warn!(
                        "Source '{}' paginates by link, ignoring page cursor {}",
                        source.name, page
                    );
                    self.advance_cursor(request.synchronization_id, 1).await?;
                    page = 1;
                    start_page = 1;
                    continue;
                }
            }

            // An empty body (or an empty root element) ends pagination like an empty list
            let page_objects = if body.is_null() {
                Vec::new()
            } else {
                extract_objects(&body, request.config.results_position.as_deref())?
            };

            if request.is_test {
                objects.extend(page_objects.into_iter().take(1));
                break;
            }

            match mode {
                PaginationMode::Link => {
                    objects.extend(page_objects);
                    match next_link(&body, &source.location) {
                        Some(next) if visited.insert(next.clone()) => {
                            endpoint = next;
                            following_link = true;
                            page += 1;
                        }
                        _ => break,
                    }
                }
                PaginationMode::Page | PaginationMode::Unknown => {
                    if page_objects.is_empty() || previous.as_ref() == Some(&page_objects) {
                        break;
                    }
                    objects.extend(page_objects.iter().cloned());
                    previous = Some(page_objects);
                    self.advance_cursor(request.synchronization_id, page + 1).await?;
                    page += 1;
                }
            }
        }

        if !request.is_test {
            self.advance_cursor(request.synchronization_id, 1).await?;
        }

        info!(
            "Fetched {} object(s) from '{}' (pages {}..={})",
            objects.len(),
            source.name,
            start_page,
            page
        );

        Ok(FetchOutcome {
            objects,
            last_page: page,
            from_first_page: start_page == 1,
        })
    }

    /// Fetch a single object from `endpoint`
    pub async fn get_object(
        &self,
        source: &mut Source,
        endpoint: &str,
        config: &SourceFetchConfig,
        headers: BTreeMap<String, String>,
        query: Vec<(String, String)>,
    ) -> Result<Value> {
        let connector = self.connector_for(&source.source_type)?;
        let mut call = config.call_config();
        call.headers.extend(headers);
        for (key, value) in query {
            call.set_query(&key, value);
        }
        self.fetch(connector, source, endpoint, config, call).await
    }

    /// One guarded call: rate-limit check, request, rate-limit refresh, decode
    async fn fetch(
        &self,
        connector: SourceConnector,
        source: &mut Source,
        endpoint: &str,
        config: &SourceFetchConfig,
        call: CallConfig,
    ) -> Result<Value> {
        source.rate_limit.guard(&source.name, Utc::now())?;

        let (method, call) = connector.prepare(config, call)?;
        let response = self.http.call(source, endpoint, method, &call).await?;
        let now = Utc::now();

        if response.status == 429 {
            source.rate_limit.mark_refused(&response.headers, now);
            source.updated = now;
            self.store.save_source(source).await?;
            return Err(source.rate_limit.exceeded(&source.name, now));
        }

        if source.rate_limit.update_from_headers(&response.headers, now) {
            source.updated = now;
            self.store.save_source(source).await?;
        }

        if !response.is_success() {
            return Err(SyncError::SourceFetch(format!(
                "'{}' {} returned HTTP {}",
                source.name, endpoint, response.status
            )));
        }

        connector.decode(&response.body)
    }

    async fn advance_cursor(&self, synchronization_id: Option<Uuid>, page: u32) -> Result<()> {
        if let Some(id) = synchronization_id {
            self.store.update_current_page(id, page).await?;
        }
        Ok(())
    }
}
