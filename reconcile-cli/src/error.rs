//! Error taxonomy for the synchronization engine

use std::collections::BTreeMap;

use thiserror::Error;

/// Result type alias used throughout the engine
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised while synchronizing
///
/// Object-scoped failures (`Mapping`, `TargetWrite`, `Extraction` of a single
/// origin id) are contained by the reconciler; everything else aborts the run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The source refused further calls until its rate-limit window resets
    #[error("rate limit exceeded for '{source_name}', retry after {retry_after}s")]
    RateLimitExceeded {
        source_name: String,
        retry_after: i64,
        headers: BTreeMap<String, String>,
    },

    /// Network or protocol failure while fetching from a source
    #[error("source fetch failed: {0}")]
    SourceFetch(String),

    /// The response did not contain a recognizable object list or identifier
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The mapping collaborator rejected the object
    #[error("mapping failed: {0}")]
    Mapping(String),

    /// The target refused or failed a write
    #[error("target write failed: {0}")]
    TargetWrite(String),

    /// A synchronization, source, mapping, contract or object did not resolve
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("no source connector can handle type '{0}'")]
    UnsupportedSourceType(String),

    #[error("no target connector can handle type '{0}'")]
    UnsupportedTargetType(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SyncError {
    /// Create a not-found error
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Status code surfaced to callers at the engine boundary
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RateLimitExceeded { .. } => 429,
            Self::NotFound { .. } => 404,
            Self::Mapping(_)
            | Self::Extraction(_)
            | Self::InvalidConfig(_)
            | Self::UnsupportedSourceType(_)
            | Self::UnsupportedTargetType(_) => 400,
            Self::SourceFetch(_)
            | Self::TargetWrite(_)
            | Self::Xml(_)
            | Self::Storage(_)
            | Self::Json(_)
            | Self::Http(_) => 500,
        }
    }

    /// Errors the reconciler must not contain: the run stops instead of
    /// marking the object invalid
    pub fn aborts_run(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. } | Self::Storage(_))
    }

    /// `X-RateLimit-*` headers to echo back when the run hit a rate limit
    pub fn rate_limit_headers(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::RateLimitExceeded { headers, .. } => Some(headers),
            _ => None,
        }
    }
}
