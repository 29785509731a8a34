//! Source rate-limit bookkeeping
//!
//! Sources announce their budget through `X-RateLimit-*` response headers.
//! The last announced state is stored on the source and checked before every
//! call: an exhausted budget fails fast instead of sleeping until the reset.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";
pub const HEADER_WINDOW: &str = "X-RateLimit-Window";
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// Values below this are treated as "seconds from now" rather than a unix timestamp
const RELATIVE_RESET_THRESHOLD: i64 = 1_000_000_000;

/// Last known rate-limit state of a source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitState {
    /// Requests allowed per window
    pub limit: Option<i64>,
    /// Requests left in the current window
    pub remaining: Option<i64>,
    /// Unix timestamp (seconds) at which the window resets
    pub reset: Option<i64>,
    /// Window length in seconds, when the source announces it
    pub window: Option<i64>,
}

impl RateLimitState {
    /// True when the budget is used up and the reset lies in the future
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        match (self.remaining, self.reset) {
            (Some(remaining), Some(reset)) => remaining <= 0 && reset > now.timestamp(),
            _ => false,
        }
    }

    /// Fail with `RateLimitExceeded` when no further call may be made
    pub fn guard(&self, source_name: &str, now: DateTime<Utc>) -> Result<(), SyncError> {
        if !self.is_exhausted(now) {
            return Ok(());
        }

        debug!(
            "Rate limit guard tripped for '{}': reset at {:?}",
            source_name, self.reset
        );
        Err(self.exceeded(source_name, now))
    }

    /// The `RateLimitExceeded` error for the current state
    pub fn exceeded(&self, source_name: &str, now: DateTime<Utc>) -> SyncError {
        SyncError::RateLimitExceeded {
            source_name: source_name.to_string(),
            retry_after: self
                .reset
                .unwrap_or_default()
                .saturating_sub(now.timestamp())
                .max(0),
            headers: self.exceeded_headers(now),
        }
    }

    /// Standard headers describing an exhausted budget
    pub fn exceeded_headers(&self, now: DateTime<Utc>) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if let Some(limit) = self.limit {
            headers.insert(HEADER_LIMIT.to_string(), limit.to_string());
        }
        headers.insert(HEADER_REMAINING.to_string(), "0".to_string());
        if let Some(reset) = self.reset {
            headers.insert(HEADER_RESET.to_string(), reset.to_string());
            headers.insert(
                HEADER_RETRY_AFTER.to_string(),
                reset.saturating_sub(now.timestamp()).max(0).to_string(),
            );
        }
        headers
    }

    /// Refresh from response headers (keys compared case-insensitively)
    ///
    /// Returns true when any value changed.
    pub fn update_from_headers(
        &mut self,
        headers: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> bool {
        let before = self.clone();

        if let Some(limit) = header_i64(headers, HEADER_LIMIT) {
            self.limit = Some(limit);
        }
        if let Some(remaining) = header_i64(headers, HEADER_REMAINING) {
            self.remaining = Some(remaining);
        }
        if let Some(reset) = header_i64(headers, HEADER_RESET) {
            self.reset = Some(absolute_reset(reset, now));
        }
        if let Some(window) = header_i64(headers, HEADER_WINDOW) {
            self.window = Some(window);
        }

        *self != before
    }

    /// Record an explicit refusal (HTTP 429), honoring `Retry-After` when present
    pub fn mark_refused(&mut self, headers: &BTreeMap<String, String>, now: DateTime<Utc>) {
        self.update_from_headers(headers, now);
        self.remaining = Some(0);
        let now_ts = now.timestamp();
        if let Some(retry_after) = header_i64(headers, HEADER_RETRY_AFTER) {
            self.reset = Some(now_ts.saturating_add(retry_after.max(0)));
        } else if self.reset.is_none_or(|reset| reset <= now_ts) {
            // A stale reset would let the next call through despite the refusal
            let window = self.window.filter(|w| *w > 0).unwrap_or(60);
            self.reset = Some(now_ts.saturating_add(window));
        }
    }
}

fn header_i64(headers: &BTreeMap<String, String>, name: &str) -> Option<i64> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, value)| value.trim().parse::<i64>().ok())
}

fn absolute_reset(reset: i64, now: DateTime<Utc>) -> i64 {
    if reset < RELATIVE_RESET_THRESHOLD {
        now.timestamp().saturating_add(reset)
    } else {
        reset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_guard_passes_without_state() {
        let state = RateLimitState::default();
        assert!(state.guard("crm", now()).is_ok());
    }

    #[test]
    fn test_guard_trips_when_exhausted_and_reset_in_future() {
        let state = RateLimitState {
            limit: Some(100),
            remaining: Some(0),
            reset: Some(1_700_000_030),
            window: None,
        };

        let err = state.guard("crm", now()).unwrap_err();
        match err {
            SyncError::RateLimitExceeded {
                retry_after,
                headers,
                ..
            } => {
                assert_eq!(retry_after, 30);
                assert_eq!(headers.get(HEADER_LIMIT), Some(&"100".to_string()));
                assert_eq!(headers.get(HEADER_REMAINING), Some(&"0".to_string()));
                assert_eq!(headers.get(HEADER_RESET), Some(&"1700000030".to_string()));
                assert_eq!(headers.get(HEADER_RETRY_AFTER), Some(&"30".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_guard_passes_once_reset_has_passed() {
        let state = RateLimitState {
            limit: Some(100),
            remaining: Some(0),
            reset: Some(1_699_999_999),
            window: None,
        };
        assert!(state.guard("crm", now()).is_ok());
    }

    #[test]
    fn test_update_from_headers_is_case_insensitive() {
        let mut state = RateLimitState::default();
        let headers = BTreeMap::from([
            ("x-ratelimit-limit".to_string(), "60".to_string()),
            ("x-ratelimit-remaining".to_string(), "59".to_string()),
            ("x-ratelimit-reset".to_string(), "1700000060".to_string()),
        ]);

        assert!(state.update_from_headers(&headers, now()));
        assert_eq!(state.limit, Some(60));
        assert_eq!(state.remaining, Some(59));
        assert_eq!(state.reset, Some(1_700_000_060));
        assert!(!state.update_from_headers(&headers, now()));
    }

    #[test]
    fn test_relative_reset_is_converted() {
        let mut state = RateLimitState::default();
        let headers = BTreeMap::from([("X-RateLimit-Reset".to_string(), "45".to_string())]);
        state.update_from_headers(&headers, now());
        assert_eq!(state.reset, Some(1_700_000_045));
    }

    #[test]
    fn test_mark_refused_uses_retry_after() {
        let mut state = RateLimitState::default();
        let headers = BTreeMap::from([("Retry-After".to_string(), "120".to_string())]);
        state.mark_refused(&headers, now());
        assert_eq!(state.remaining, Some(0));
        assert_eq!(state.reset, Some(1_700_000_120));
        assert!(state.is_exhausted(now()));
    }

    #[test]
    fn test_huge_retry_after_saturates() {
        let mut state = RateLimitState::default();
        let headers = BTreeMap::from([(
            "Retry-After".to_string(),
            i64::MAX.to_string(),
        )]);
        state.mark_refused(&headers, now());
        assert_eq!(state.reset, Some(i64::MAX));
        assert!(state.is_exhausted(now()));
        assert!(state.guard("crm", now()).is_err());
    }

    #[test]
    fn test_extreme_relative_resets() {
        let mut state = RateLimitState::default();
        let headers = BTreeMap::from([(
            "X-RateLimit-Reset".to_string(),
            i64::MIN.to_string(),
        )]);
        state.update_from_headers(&headers, now());
        assert!(state.reset.unwrap() < now().timestamp());
        assert!(!state.is_exhausted(now()));

        let headers = BTreeMap::from([(
            "X-RateLimit-Reset".to_string(),
            (RELATIVE_RESET_THRESHOLD - 1).to_string(),
        )]);
        state.update_from_headers(&headers, now());
        assert_eq!(state.reset, Some(now().timestamp() + RELATIVE_RESET_THRESHOLD - 1));
    }

    #[test]
    fn test_refusal_without_retry_after_replaces_stale_reset() {
        let mut state = RateLimitState {
            limit: Some(10),
            remaining: Some(3),
            reset: Some(1_699_999_000),
            window: Some(30),
        };
        state.mark_refused(&BTreeMap::new(), now());
        assert_eq!(state.reset, Some(1_700_000_030));
        assert!(state.guard("crm", now()).is_err());
    }
}
