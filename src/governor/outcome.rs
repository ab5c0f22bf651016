//! # Governed Call Outcomes
//!
//! Every governed call ends in one of two shapes: the unit of work's own
//! value, or a [`Throttled`] record telling the caller how long to wait.
//! Unrelated failures are not an outcome; they come back as the caller's own
//! error type.
//!
//! On the wire a throttled outcome looks like this:
//!
//! ```text
//!     {
//!       "error": "ratelimited",
//!       "retry_after": 2,
//!       "eta": "2026-10-15T09:12:04.517Z",
//!       "message": "Rate limit hit for chat_postMessage. Waiting 2 seconds. ETA: 2026-10-15T09:12:04.517Z."
//!     }
//! ```

use super::{
    ledger::LimitSnapshot,
    signal::RATELIMITED_MARKER,
    utils::{display_seconds, format_eta},
};
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

/// Structured "do not retry before ETA" result.
///
/// Built from a single ledger snapshot, so `eta` is exactly `wait` after the
/// moment it was produced. It is a snapshot and is not refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Throttled {
    operation: String,
    wait: Duration,
    retry_after: u64,
    eta: DateTime<Utc>,
    message: String,
}

impl Throttled {
    /// Builds a throttled outcome for `operation` from a ledger snapshot.
    pub fn from_snapshot(operation: &str, snapshot: LimitSnapshot) -> Self {
        let retry_after = display_seconds(snapshot.wait);
        let eta_text = format_eta(&snapshot.eta);
        let message = format!(
            "Rate limit hit for {}. Waiting {} seconds. ETA: {}.",
            operation, retry_after, eta_text
        );

        Self {
            operation: operation.to_owned(),
            wait: snapshot.wait,
            retry_after,
            eta: snapshot.eta,
            message,
        }
    }

    /// The operation identifier that is cooling down.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Seconds to wait, rounded up.
    pub fn retry_after(&self) -> u64 {
        self.retry_after
    }

    /// The exact remaining wait at the time this outcome was produced.
    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Wall-clock time after which the operation may be called again.
    pub fn eta(&self) -> DateTime<Utc> {
        self.eta
    }

    /// The ETA as an RFC 3339 timestamp.
    pub fn eta_string(&self) -> String {
        format_eta(&self.eta)
    }

    /// Human-readable description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The wire record: `{error, retry_after, eta, message}`.
    pub fn to_json(&self) -> Value {
        json!({
            "error": RATELIMITED_MARKER,
            "retry_after": self.retry_after,
            "eta": self.eta_string(),
            "message": self.message,
        })
    }
}

impl Serialize for Throttled {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut record = serializer.serialize_struct("Throttled", 4)?;
        record.serialize_field("error", RATELIMITED_MARKER)?;
        record.serialize_field("retry_after", &self.retry_after)?;
        record.serialize_field("eta", &self.eta_string())?;
        record.serialize_field("message", &self.message)?;
        record.end()
    }
}

impl fmt::Display for Throttled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of a governed call that did not fail outright.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The unit of work ran and returned this value.
    Completed(T),

    /// The operation is cooling down; the caller decides whether to retry.
    Throttled(Throttled),
}

impl<T> Outcome<T> {
    /// Returns `true` if the call was throttled.
    #[inline]
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled(_))
    }

    /// Returns the completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Throttled(_) => None,
        }
    }

    /// Returns the throttled record, if any.
    pub fn throttled(&self) -> Option<&Throttled> {
        match self {
            Self::Completed(_) => None,
            Self::Throttled(throttled) => Some(throttled),
        }
    }
}

impl Outcome<Value> {
    /// Collapses the outcome into a single JSON value: the payload itself, or
    /// the throttled wire record.
    pub fn into_json(self) -> Value {
        match self {
            Self::Completed(payload) => payload,
            Self::Throttled(throttled) => throttled.to_json(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(wait: Duration) -> LimitSnapshot {
        LimitSnapshot {
            wait,
            eta: Utc.with_ymd_and_hms(2026, 10, 15, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_throttled_rounds_up() {
        let throttled = Throttled::from_snapshot("chat.send", snapshot(Duration::from_millis(1900)));

        assert_eq!(throttled.operation(), "chat.send");
        assert_eq!(throttled.retry_after(), 2);
        assert_eq!(throttled.wait(), Duration::from_millis(1900));
        assert_eq!(throttled.eta_string(), "2026-10-15T09:00:00.000Z");
        assert_eq!(
            throttled.message(),
            "Rate limit hit for chat.send. Waiting 2 seconds. ETA: 2026-10-15T09:00:00.000Z."
        );
        assert_eq!(throttled.to_string(), throttled.message());
    }

    #[test]
    fn test_wire_record() {
        let throttled = Throttled::from_snapshot("users_list", snapshot(Duration::from_secs(30)));
        let expected = json!({
            "error": "ratelimited",
            "retry_after": 30,
            "eta": "2026-10-15T09:00:00.000Z",
            "message": "Rate limit hit for users_list. Waiting 30 seconds. ETA: 2026-10-15T09:00:00.000Z.",
        });

        assert_eq!(throttled.to_json(), expected);
        assert_eq!(serde_json::to_value(&throttled).unwrap(), expected);
    }

    #[test]
    fn test_outcome_accessors() {
        let done: Outcome<u32> = Outcome::Completed(7);
        assert!(!done.is_throttled());
        assert!(done.throttled().is_none());
        assert_eq!(done.completed(), Some(7));

        let throttled = Throttled::from_snapshot("op", snapshot(Duration::from_secs(1)));
        let limited: Outcome<u32> = Outcome::Throttled(throttled.clone());
        assert!(limited.is_throttled());
        assert_eq!(limited.throttled(), Some(&throttled));
        assert_eq!(limited.completed(), None);
    }

    #[test]
    fn test_outcome_into_json() {
        let payload = json!({"ok": true});
        assert_eq!(Outcome::Completed(payload.clone()).into_json(), payload);

        let throttled = Throttled::from_snapshot("op", snapshot(Duration::from_secs(3)));
        let value = Outcome::<Value>::Throttled(throttled).into_json();
        assert_eq!(value["error"], "ratelimited");
        assert_eq!(value["retry_after"], 3);
    }
}
