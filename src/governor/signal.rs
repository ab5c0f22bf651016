//! # Throttle Signal Classification
//!
//! Remote calls surface throttling in two different ways: some return a
//! normal-looking payload with an error marker in it, others fail with an
//! HTTP 429. This module turns both into one closed type, [`WorkOutcome`],
//! before anything reaches the dispatcher.
//!
//! ```text
//!     Raw result of a remote call                 WorkOutcome
//!     ───────────────────────────                 ───────────
//!     Ok({"ok": true, ...})              ──►      Success(payload)
//!     Ok({"error": "ratelimited",
//!         "retry_after": 5})             ──►      ThrottleSignal(Some(5s))
//!     Ok({"error": "ratelimited"})       ──►      ThrottleSignal(None)
//!     Err(429, Retry-After: 1)           ──►      ThrottleSignal(Some(1s))
//!     Err(429, no Retry-After)           ──►      ThrottleSignal(None)
//!     Err(500, ...)                      ──►      OtherFailure(err)
//! ```
//!
//! A `ThrottleSignal(None)` is still a recognized throttle. The dispatcher
//! fills in the configured default duration.

use super::ledger::MAX_COOLDOWN;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Value of the `error` field that marks a payload as a throttle signal.
pub const RATELIMITED_MARKER: &str = "ratelimited";

/// HTTP status the remote service uses for "too many requests".
pub const TOO_MANY_REQUESTS: u16 = 429;

/// Name of the header carrying the retry-after duration.
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

/// The result of one unit of work, as seen by the dispatcher.
///
/// Adapters at the remote-call boundary produce this; the dispatcher only
/// ever matches on these three cases.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkOutcome<T, E> {
    /// The call completed and its value should be passed through.
    Success(T),

    /// The remote service asked us to back off.
    ///
    /// `None` means the signal was recognized but carried no usable duration.
    ThrottleSignal(Option<Duration>),

    /// The call failed for a reason unrelated to throttling.
    OtherFailure(E),
}

impl<T, E> WorkOutcome<T, E> {
    /// Returns `true` for [`WorkOutcome::ThrottleSignal`].
    #[inline]
    pub fn is_throttle_signal(&self) -> bool {
        matches!(self, Self::ThrottleSignal(_))
    }

    /// Maps the success value, leaving the other cases untouched.
    pub fn map<U, F>(self, f: F) -> WorkOutcome<U, E>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Success(value) => WorkOutcome::Success(f(value)),
            Self::ThrottleSignal(retry_after) => WorkOutcome::ThrottleSignal(retry_after),
            Self::OtherFailure(err) => WorkOutcome::OtherFailure(err),
        }
    }
}

/// Plain results carry no throttle information: `Ok` is a success and `Err`
/// is an unrelated failure.
impl<T, E> From<Result<T, E>> for WorkOutcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::OtherFailure(err),
        }
    }
}

/// A failure that may carry an HTTP status code and response headers.
///
/// Implement this for the error type of whatever client performs the remote
/// call so that [`classify_failure`] can recognize 429 responses.
pub trait HttpFailure {
    /// HTTP status of the failed response, if there was one.
    fn status_code(&self) -> Option<u16>;

    /// Looks up a response header. Implementations should match names
    /// case-insensitively.
    fn header(&self, name: &str) -> Option<&str>;
}

/// A ready-made [`HttpFailure`] for callers without their own error type.
///
/// ```rust
/// use callgate::{ApiFailure, HttpFailure};
///
/// let err = ApiFailure::new("ratelimited")
///     .with_status(429)
///     .with_header("Retry-After", "1");
///
/// assert_eq!(err.status_code(), Some(429));
/// assert_eq!(err.header("retry-after"), Some("1"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApiFailure {
    status: Option<u16>,
    headers: Vec<(String, String)>,
    message: String,
}

impl ApiFailure {
    /// Creates a failure with no status and no headers.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            headers: Vec::new(),
            message: message.into(),
        }
    }

    /// A 429 response, optionally with a `Retry-After` header in seconds.
    pub fn too_many_requests(retry_after_secs: Option<u64>) -> Self {
        let failure = Self::new("ratelimited").with_status(TOO_MANY_REQUESTS);
        match retry_after_secs {
            Some(secs) => failure.with_header(RETRY_AFTER_HEADER, secs.to_string()),
            None => failure,
        }
    }

    /// Sets the HTTP status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Adds a response header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl HttpFailure for ApiFailure {
    fn status_code(&self) -> Option<u16> {
        self.status
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Returns `true` if the payload carries the `"error": "ratelimited"` marker.
#[inline]
pub fn is_throttle_payload(payload: &Value) -> bool {
    payload.get("error").and_then(Value::as_str) == Some(RATELIMITED_MARKER)
}

/// Extracts the `retry_after` field of a throttle payload.
///
/// Accepts integers, floats and numeric strings. Returns `None` when the
/// field is missing, not numeric, or not strictly positive.
pub fn payload_retry_after(payload: &Value) -> Option<Duration> {
    let secs = match payload.get("retry_after")? {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    positive_secs(secs)
}

/// Parses a `Retry-After` header value.
///
/// Supports both forms allowed by HTTP: delta-seconds (`"120"`) and an
/// HTTP-date (`"Wed, 21 Oct 2026 07:28:00 GMT"`). Returns `None` for zero,
/// dates in the past, and anything unparsable. Delta-seconds too large for
/// a `u64` saturate to [`MAX_COOLDOWN`].
///
/// ```rust
/// use callgate::parse_retry_after;
/// use std::time::Duration;
///
/// assert_eq!(parse_retry_after("1"), Some(Duration::from_secs(1)));
/// assert_eq!(parse_retry_after(" 30 "), Some(Duration::from_secs(30)));
/// assert_eq!(parse_retry_after("soon"), None);
/// assert_eq!(parse_retry_after("0"), None);
/// ```
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    parse_retry_after_at(value, Utc::now())
}

pub(crate) fn parse_retry_after_at(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        // Too many digits for a u64 is still a request to wait a long time
        let wait = value.parse::<u64>().map_or(MAX_COOLDOWN, Duration::from_secs);
        return Some(wait).filter(|wait| !wait.is_zero());
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    date.signed_duration_since(now)
        .to_std()
        .ok()
        .filter(|wait| !wait.is_zero())
}

/// Classifies a successful payload.
///
/// A payload with the throttle marker becomes a
/// [`WorkOutcome::ThrottleSignal`]; anything else is passed through as
/// [`WorkOutcome::Success`].
pub fn classify_payload<E>(payload: Value) -> WorkOutcome<Value, E> {
    if is_throttle_payload(&payload) {
        WorkOutcome::ThrottleSignal(payload_retry_after(&payload))
    } else {
        WorkOutcome::Success(payload)
    }
}

/// Classifies a failure.
///
/// A 429 becomes a [`WorkOutcome::ThrottleSignal`] using the `Retry-After`
/// header if it parses. Everything else is returned untouched as
/// [`WorkOutcome::OtherFailure`].
pub fn classify_failure<T, E>(err: E) -> WorkOutcome<T, E>
where
    E: HttpFailure,
{
    if err.status_code() == Some(TOO_MANY_REQUESTS) {
        WorkOutcome::ThrottleSignal(err.header(RETRY_AFTER_HEADER).and_then(parse_retry_after))
    } else {
        WorkOutcome::OtherFailure(err)
    }
}

/// Classifies the raw result of a JSON remote call, covering both throttle
/// paths.
///
/// ```rust
/// use callgate::{classify, ApiFailure, WorkOutcome};
/// use serde_json::json;
/// use std::time::Duration;
///
/// let outcome = classify::<ApiFailure>(Ok(json!({"error": "ratelimited", "retry_after": 5})));
/// assert_eq!(outcome, WorkOutcome::ThrottleSignal(Some(Duration::from_secs(5))));
///
/// let outcome = classify(Err(ApiFailure::too_many_requests(Some(1))));
/// assert_eq!(outcome, WorkOutcome::ThrottleSignal(Some(Duration::from_secs(1))));
/// ```
pub fn classify<E>(result: Result<Value, E>) -> WorkOutcome<Value, E>
where
    E: HttpFailure,
{
    match result {
        Ok(payload) => classify_payload(payload),
        Err(err) => classify_failure(err),
    }
}

fn positive_secs(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Some(Duration::try_from_secs_f64(secs).unwrap_or(MAX_COOLDOWN))
    } else {
        None
    }
}
