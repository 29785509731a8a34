//! Run logs and per-object contract logs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Per-run tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub found: u32,
    pub skipped: u32,
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
    pub invalid: u32,
}

/// Record of a single synchronization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizationLog {
    pub id: Uuid,
    pub synchronization_id: Uuid,
    #[serde(flatten)]
    pub counters: RunCounters,
    pub message: Option<String>,
    pub test: bool,
    pub force: bool,
    pub execution_time_ms: u64,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl SynchronizationLog {
    pub fn start(synchronization_id: Uuid, test: bool, force: bool, retention_days: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            synchronization_id,
            counters: RunCounters::default(),
            message: None,
            test,
            force,
            execution_time_ms: 0,
            created: now,
            expires: now + Duration::days(retention_days),
        }
    }

    pub fn is_success(&self) -> bool {
        self.message.as_deref() == Some("Success")
    }
}

/// Outcome recorded for one object in a contract log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractLogResult {
    Created,
    Updated,
    Skipped,
    Invalid,
    Deleted,
}

impl ContractLogResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Skipped => "skipped",
            Self::Invalid => "invalid",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "skipped" => Some(Self::Skipped),
            "invalid" => Some(Self::Invalid),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Append-only record of what happened to one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizationContractLog {
    pub id: Uuid,
    pub synchronization_id: Uuid,
    pub contract_id: Option<Uuid>,
    pub run_log_id: Option<Uuid>,
    pub origin_id: Option<String>,
    pub target_id: Option<String>,
    /// Target action attempted (`create`, `update`, `delete`), if any
    pub action: Option<String>,
    pub target_result: ContractLogResult,
    pub error: Option<String>,
    pub source_object: Option<Value>,
    pub target_object: Option<Value>,
    pub test: bool,
    pub force: bool,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl SynchronizationContractLog {
    pub fn new(
        synchronization_id: Uuid,
        target_result: ContractLogResult,
        retention_days: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            synchronization_id,
            contract_id: None,
            run_log_id: None,
            origin_id: None,
            target_id: None,
            action: None,
            target_result,
            error: None,
            source_object: None,
            target_object: None,
            test: false,
            force: false,
            created: now,
            expires: now + Duration::days(retention_days),
        }
    }
}
