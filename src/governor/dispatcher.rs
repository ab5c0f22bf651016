//! # Governed Dispatcher
//!
//! Wraps a unit of work (one remote call attempt) with the
//! check → execute → interpret → update protocol against a shared
//! [`RateLimitLedger`].
//!
//! ## Dispatch Flow
//!
//! ```text
//!     dispatch(op, work)
//!          │
//!          ▼
//!     Ledger pending? ──Yes──► Throttled (work not called)
//!          │
//!          No
//!          ▼
//!     work() ──► Success(v) ─────────► Completed(v)       ledger untouched
//!          │
//!          ├──► ThrottleSignal(d) ───► set_limit(op, d)    d defaults to 30s
//!          │                           Throttled
//!          │
//!          └──► OtherFailure(e) ─────► Err(e)             ledger untouched
//! ```
//!
//! The dispatcher never sleeps and never retries. A throttled caller gets the
//! wait and ETA back immediately and decides for itself when to try again.
//! Two concurrent calls for the same operation may both run; the gate only
//! stops calls made during a known cooldown.

use super::{
    config::{ConfigError, GovernorConfig},
    ledger::{LimitSnapshot, RateLimitLedger, MAX_COOLDOWN},
    metrics::{DispatchCounters, DispatchMetrics},
    outcome::{Outcome, Throttled},
    signal::{classify, HttpFailure, WorkOutcome},
    utils::eta_from,
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Gate between callers and a rate-limited remote service.
///
/// Cloning a dispatcher is cheap and the clone shares the same ledger and
/// counters, so one dispatcher can be handed to every worker thread.
///
/// ## Example
///
/// ```rust
/// use callgate::{GovernedDispatcher, Outcome, WorkOutcome};
/// use std::time::Duration;
///
/// let dispatcher = GovernedDispatcher::new();
///
/// // The remote service tells us to back off for 2 seconds
/// let first = dispatcher.dispatch("chat.send", || {
///     WorkOutcome::<(), ()>::ThrottleSignal(Some(Duration::from_secs(2)))
/// });
/// assert!(first.unwrap().is_throttled());
///
/// // The next call is rejected without running the work
/// let second = dispatcher.dispatch("chat.send", || -> WorkOutcome<(), ()> {
///     unreachable!("cooldown is pending")
/// });
/// match second.unwrap() {
///     Outcome::Throttled(throttled) => assert_eq!(throttled.retry_after(), 2),
///     Outcome::Completed(_) => unreachable!(),
/// }
/// ```
#[derive(Clone)]
pub struct GovernedDispatcher {
    /// Shared next-allowed state, possibly shared with other dispatchers.
    ledger: Arc<RateLimitLedger>,

    config: GovernorConfig,

    counters: Arc<DispatchCounters>,
}

impl GovernedDispatcher {
    /// Creates a dispatcher with the default configuration and its own ledger.
    pub fn new() -> Self {
        Self::from_parts(
            Arc::new(RateLimitLedger::new()),
            GovernorConfig::default(),
        )
    }

    /// Creates a dispatcher with its own ledger.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid (see [`GovernorConfig::validate`]).
    /// Use [`GovernedDispatcher::try_with_config`] to handle the error.
    pub fn with_config(config: GovernorConfig) -> Self {
        Self::try_with_config(config).expect("Invalid governor configuration")
    }

    /// Creates a dispatcher with its own ledger, validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns the validation error if the configuration is invalid.
    pub fn try_with_config(config: GovernorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let ledger = Arc::new(RateLimitLedger::with_policy(config.overwrite_policy));
        Ok(Self::from_parts(ledger, config))
    }

    /// Creates a dispatcher on top of an existing ledger.
    ///
    /// Use this when several dispatchers must respect the same cooldowns.
    /// The ledger's own overwrite policy applies; the one in `config` is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns the validation error if the configuration is invalid.
    pub fn with_ledger(
        ledger: Arc<RateLimitLedger>,
        config: GovernorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let config = config.with_overwrite_policy(ledger.policy());
        Ok(Self::from_parts(ledger, config))
    }

    fn from_parts(ledger: Arc<RateLimitLedger>, config: GovernorConfig) -> Self {
        Self {
            ledger,
            config,
            counters: Arc::new(DispatchCounters::default()),
        }
    }

    /// The ledger this dispatcher consults.
    #[inline]
    pub fn ledger(&self) -> &Arc<RateLimitLedger> {
        &self.ledger
    }

    /// The configuration this dispatcher was built with.
    #[inline]
    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Runs `work` for `operation` unless a cooldown is pending.
    ///
    /// - Cooldown pending: `work` is not called; returns `Ok(Outcome::Throttled)`.
    /// - `work` returns `Success(v)`: returns `Ok(Outcome::Completed(v))`.
    /// - `work` returns `ThrottleSignal(d)`: records a cooldown of `d` (or the
    ///   configured default) and returns `Ok(Outcome::Throttled)` for this call.
    /// - `work` returns `OtherFailure(e)`: returns `Err(e)` unchanged.
    ///
    /// `work` is called at most once and no lock is held while it runs.
    ///
    /// # Errors
    ///
    /// Only the unit of work's own unrelated failures are returned as errors.
    /// Throttling is never an error.
    pub fn dispatch<T, E, F>(&self, operation: &str, work: F) -> Result<Outcome<T>, E>
    where
        F: FnOnce() -> WorkOutcome<T, E>,
    {
        self.counters.on_dispatch();

        if let Some(snapshot) = self.ledger.snapshot(operation) {
            self.counters.on_short_circuit();
            debug!(
                "Short-circuiting {}: cooling down for another {:?}",
                operation, snapshot.wait
            );
            return Ok(Outcome::Throttled(Throttled::from_snapshot(operation, snapshot)));
        }

        match work() {
            WorkOutcome::Success(value) => {
                self.counters.on_completed();
                Ok(Outcome::Completed(value))
            }
            WorkOutcome::ThrottleSignal(retry_after) => {
                self.counters.on_throttle_signal();
                Ok(Outcome::Throttled(self.record_signal(operation, retry_after)))
            }
            WorkOutcome::OtherFailure(err) => {
                self.counters.on_failure();
                debug!("Propagating unrelated failure from {}", operation);
                Err(err)
            }
        }
    }

    /// Runs a JSON-returning remote call through the governor.
    ///
    /// Both throttle paths are recognized: a payload with
    /// `"error": "ratelimited"` and a failure with HTTP status 429. The result
    /// is the call's own payload, or the throttled wire record
    /// `{error, retry_after, eta, message}`.
    ///
    /// ```rust
    /// use callgate::{ApiFailure, GovernedDispatcher};
    /// use serde_json::json;
    ///
    /// let dispatcher = GovernedDispatcher::new();
    ///
    /// let value = dispatcher
    ///     .dispatch_json("users_list", || Ok::<_, ApiFailure>(json!({"ok": true})))
    ///     .unwrap();
    /// assert_eq!(value, json!({"ok": true}));
    ///
    /// let value = dispatcher
    ///     .dispatch_json("chat_postMessage", || Err(ApiFailure::too_many_requests(Some(1))))
    ///     .unwrap();
    /// assert_eq!(value["error"], "ratelimited");
    /// assert_eq!(value["retry_after"], 1);
    /// ```
    ///
    /// # Errors
    ///
    /// Failures other than a 429 are returned unchanged.
    pub fn dispatch_json<E, F>(&self, operation: &str, call: F) -> Result<Value, E>
    where
        E: HttpFailure,
        F: FnOnce() -> Result<Value, E>,
    {
        self.dispatch(operation, || classify(call()))
            .map(Outcome::into_json)
    }

    /// Returns a snapshot of this dispatcher's counters.
    ///
    /// Clones share counters, so this covers every clone.
    pub fn metrics(&self) -> DispatchMetrics {
        self.counters.snapshot()
    }

    /// Records a throttle signal and builds the outcome for the call that
    /// discovered it.
    fn record_signal(&self, operation: &str, retry_after: Option<Duration>) -> Throttled {
        let retry_after = retry_after
            .filter(|wait| !wait.is_zero())
            .unwrap_or(self.config.default_retry_after);

        let next_allowed = self.ledger.set_limit(operation, retry_after);
        warn!(
            "Rate limit signaled for {}: backing off for {:?}",
            operation, retry_after
        );

        // Built from the instant just stored, not a fresh read, so a racing
        // writer can't make this call report someone else's cooldown. A
        // sub-millisecond wait may already be over; report the signaled one.
        let snapshot = LimitSnapshot::until(next_allowed).unwrap_or_else(|| {
            let wait = retry_after.min(MAX_COOLDOWN);
            LimitSnapshot {
                wait,
                eta: eta_from(Utc::now(), wait),
            }
        });
        Throttled::from_snapshot(operation, snapshot)
    }
}

impl Default for GovernedDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GovernedDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernedDispatcher")
            .field("ledger", &self.ledger)
            .field("default_retry_after", &self.config.default_retry_after)
            .finish()
    }
}
