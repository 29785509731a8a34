//! Synchronization contracts: the durable link between an origin object and
//! its counterpart in the target

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on the backoff exponent (5s * 2^8 ≈ 21 minutes)
const MAX_BACKOFF_EXPONENT: u32 = 8;
const BACKOFF_BASE_SECS: i64 = 5;

/// Last write applied to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetAction {
    Create,
    Update,
    Delete,
}

impl TargetAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// At most one contract exists per `(synchronization_id, origin_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizationContract {
    pub id: Uuid,
    pub synchronization_id: Uuid,
    /// Set on contracts of nested sub-objects; those are owned by their parent
    pub parent_id: Option<Uuid>,
    pub origin_id: String,
    /// Hash of the mapped representation last written
    pub origin_hash: Option<String>,
    pub target_id: Option<String>,
    /// Hash of the payload last written to the target
    pub target_hash: Option<String>,
    pub target_last_action: Option<TargetAction>,
    pub source_last_checked: Option<DateTime<Utc>>,
    pub target_last_synced: Option<DateTime<Utc>>,
    pub try_counter: u32,
    /// Do not retry before this moment
    pub retry_after: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl SynchronizationContract {
    pub fn new(synchronization_id: Uuid, origin_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            synchronization_id,
            parent_id: None,
            origin_id: origin_id.into(),
            origin_hash: None,
            target_id: None,
            target_hash: None,
            target_last_action: None,
            source_last_checked: None,
            target_last_synced: None,
            try_counter: 0,
            retry_after: None,
            created: now,
            updated: now,
        }
    }

    /// Contract for an object nested inside the target object of `parent`
    pub fn child(parent: &SynchronizationContract, origin_id: impl Into<String>) -> Self {
        let mut contract = Self::new(parent.synchronization_id, origin_id);
        contract.parent_id = Some(parent.id);
        contract
    }

    /// True while a previous failure's backoff has not elapsed
    pub fn is_backing_off(&self, now: DateTime<Utc>) -> bool {
        self.retry_after.is_some_and(|at| at > now)
    }

    /// Bump the failure counter and push `retry_after` out exponentially
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.try_counter = self.try_counter.saturating_add(1);
        let exponent = self.try_counter.min(MAX_BACKOFF_EXPONENT);
        let delay = BACKOFF_BASE_SECS * 2_i64.pow(exponent);
        self.retry_after = Some(now + Duration::seconds(delay));
        self.updated = now;
    }

    pub fn reset_failures(&mut self) {
        self.try_counter = 0;
        self.retry_after = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_backoff_is_capped() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut contract = SynchronizationContract::new(Uuid::new_v4(), "1");

        contract.record_failure(now);
        assert_eq!(contract.try_counter, 1);
        assert_eq!(contract.retry_after, Some(now + Duration::seconds(10)));
        assert!(contract.is_backing_off(now));

        for _ in 0..20 {
            contract.record_failure(now);
        }
        assert_eq!(contract.retry_after, Some(now + Duration::seconds(5 * 256)));

        contract.reset_failures();
        assert_eq!(contract.try_counter, 0);
        assert!(!contract.is_backing_off(now));
    }

    #[test]
    fn test_child_inherits_synchronization() {
        let parent = SynchronizationContract::new(Uuid::new_v4(), "p");
        let child = SynchronizationContract::child(&parent, "c");
        assert_eq!(child.synchronization_id, parent.synchronization_id);
        assert_eq!(child.parent_id, Some(parent.id));
    }

    #[test]
    fn test_target_action_round_trip() {
        for action in [TargetAction::Create, TargetAction::Update, TargetAction::Delete] {
            assert_eq!(TargetAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(TargetAction::parse("noop"), None);
    }
}
