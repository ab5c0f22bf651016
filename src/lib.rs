//! # Callgate - Per-Operation Call Governor
//!
//! A small, thread-safe gate that sits between your code and a rate-limited
//! remote API. It remembers, per operation, when the remote service last told
//! you to back off, and stops further calls to that operation until the
//! cooldown has passed.
//!
//! ## What Problem Does This Solve?
//!
//! Remote APIs signal throttling inconsistently. Some calls return a normal
//! payload with an error marker, others fail with HTTP 429 and a
//! `Retry-After` header. Callgate recognizes both and turns them into one
//! answer: "this operation is throttled, try again in N seconds, at ETA".
//!
//! ```text
//!     Timeline for one operation ("chat.send"):
//!
//!     t=0.0  call ──► remote: 429, Retry-After: 2 ──► Throttled (2s)
//!     t=0.1  call ──► (not sent)                  ──► Throttled (2s, rounded up from 1.9)
//!     t=2.2  call ──► remote: 200                 ──► Completed
//! ```
//!
//! Callgate never sleeps and never retries for you. Every throttled call
//! returns immediately with a wait and an ETA; whether and when to retry is
//! your decision.
//!
//! ## Quick Start
//!
//! ```rust
//! use callgate::{GovernedDispatcher, Outcome, WorkOutcome};
//! use std::time::Duration;
//!
//! let dispatcher = GovernedDispatcher::new();
//!
//! let outcome = dispatcher.dispatch("users_list", || {
//!     // Perform the remote call here and classify what came back
//!     WorkOutcome::<_, std::io::Error>::Success(vec!["U123", "U456"])
//! });
//!
//! match outcome {
//!     Ok(Outcome::Completed(users)) => println!("Got {} users", users.len()),
//!     Ok(Outcome::Throttled(throttled)) => println!("{}", throttled.message()),
//!     Err(err) => eprintln!("Remote call failed: {}", err),
//! }
//! ```
//!
//! ### JSON APIs
//!
//! For clients that return `serde_json::Value` and an error type carrying an
//! HTTP status, [`GovernedDispatcher::dispatch_json`] handles classification
//! and returns either the payload or the throttled record
//! `{"error": "ratelimited", "retry_after", "eta", "message"}`.
//!
//! ```rust
//! use callgate::{ApiFailure, GovernedDispatcher};
//! use serde_json::json;
//!
//! let dispatcher = GovernedDispatcher::new();
//! let value = dispatcher
//!     .dispatch_json("search_messages", || {
//!         Ok::<_, ApiFailure>(json!({"error": "ratelimited", "retry_after": 5}))
//!     })
//!     .unwrap();
//!
//! assert_eq!(value["retry_after"], 5);
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │   Operation catalog     │
//!                    └──────────┬──────────────┘
//!                               │ dispatch(op, work)
//!                    ┌──────────▼──────────────┐
//!                    │   GovernedDispatcher    │
//!                    └──────────┬──────────────┘
//!                               │
//!                ┌──────────────┴───────────────┐
//!                │                              │
//!     ┌──────────▼──────────┐       ┌───────────▼──────────┐
//!     │   RateLimitLedger   │       │   Signal adapters    │
//!     ├─────────────────────┤       ├──────────────────────┤
//!     │ • op → Instant      │       │ • "ratelimited" body │
//!     │ • sharded map       │       │ • HTTP 429 + header  │
//!     │ • overwrite policy  │       │ • WorkOutcome        │
//!     └─────────────────────┘       └──────────────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! - `RateLimitLedger` - share via `Arc<RateLimitLedger>`
//! - `GovernedDispatcher` - `Clone` shares its ledger and counters
//!
//! No lock is ever held while a unit of work runs.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

// Internal module
mod governor;

// Public re-exports
pub use governor::{
    classify, classify_failure, classify_payload, display_seconds, format_eta,
    is_throttle_payload, parse_retry_after, payload_retry_after, wall_clock_eta, ApiFailure,
    ConfigError, DispatchMetrics, GovernedDispatcher, GovernorConfig, HttpFailure, LedgerStats,
    LimitSnapshot, Outcome, OverwritePolicy, RateLimitLedger, Throttled, WorkOutcome,
    DEFAULT_RETRY_AFTER, MAX_COOLDOWN, RATELIMITED_MARKER, RETRY_AFTER_HEADER,
    TOO_MANY_REQUESTS,
};

use std::time::Duration;

/// A ledger wrapped in `Arc` for sharing between dispatchers.
///
/// # Example
/// ```rust
/// use callgate::{GovernedDispatcher, GovernorConfig, RateLimitLedger, SharedLedger};
/// use std::sync::Arc;
///
/// let ledger: SharedLedger = Arc::new(RateLimitLedger::new());
/// let bot = GovernedDispatcher::with_ledger(ledger.clone(), GovernorConfig::default()).unwrap();
/// let admin = GovernedDispatcher::with_ledger(ledger, GovernorConfig::default()).unwrap();
/// ```
pub type SharedLedger = std::sync::Arc<RateLimitLedger>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
pub const MSRV: &str = "1.70.0";

/// Prelude module for convenient imports.
///
/// ```rust
/// use callgate::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for typical governed-call use.
    //!
    //! # Example
    //! ```rust
    //! use callgate::prelude::*;
    //!
    //! let dispatcher = GovernedDispatcher::new();
    //! let outcome: Result<Outcome<u8>, ApiFailure> =
    //!     dispatcher.dispatch("users_list", || WorkOutcome::Success(1));
    //! ```

    pub use crate::{
        ApiFailure, GovernedDispatcher, GovernorBuilder, GovernorConfig, HttpFailure, Outcome,
        OverwritePolicy, RateLimitLedger, SharedLedger, Throttled, WorkOutcome,
    };
}

/// Builder for governed dispatchers.
///
/// # Example
///
/// ```rust
/// use callgate::{GovernorBuilder, OverwritePolicy};
///
/// let dispatcher = GovernorBuilder::new()
///     .default_retry_after_secs(10)
///     .overwrite_policy(OverwritePolicy::LongestWaitWins)
///     .build();
///
/// // Or use try_build() for error handling
/// let result = GovernorBuilder::new()
///     .default_retry_after_secs(0)  // Invalid!
///     .try_build();
///
/// assert!(result.is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct GovernorBuilder {
    config: GovernorConfig,
    ledger: Option<SharedLedger>,
}

impl GovernorBuilder {
    /// Creates a builder with the default configuration: 30 second fallback
    /// retry-after, last signal wins, fresh ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry-after used when a throttle signal carries none.
    pub fn default_retry_after(mut self, retry_after: Duration) -> Self {
        self.config.default_retry_after = retry_after;
        self
    }

    /// Same as [`GovernorBuilder::default_retry_after`], in whole seconds.
    pub fn default_retry_after_secs(self, secs: u64) -> Self {
        self.default_retry_after(Duration::from_secs(secs))
    }

    /// Sets how a new throttle signal is merged with a pending cooldown.
    ///
    /// Ignored when an existing ledger is supplied with
    /// [`GovernorBuilder::shared_ledger`]; that ledger keeps its own policy.
    pub fn overwrite_policy(mut self, policy: OverwritePolicy) -> Self {
        self.config.overwrite_policy = policy;
        self
    }

    /// Builds on top of an existing ledger instead of creating a new one.
    pub fn shared_ledger(mut self, ledger: SharedLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Builds the dispatcher.
    ///
    /// # Panics
    ///
    /// Panics if the fallback retry-after is zero. Use `try_build()` to
    /// handle the error.
    pub fn build(self) -> GovernedDispatcher {
        self.try_build().expect("Invalid governor configuration")
    }

    /// Builds the dispatcher, returning an error if the configuration is
    /// invalid.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if validation fails.
    pub fn try_build(self) -> Result<GovernedDispatcher, ConfigError> {
        match self.ledger {
            Some(ledger) => GovernedDispatcher::with_ledger(ledger, self.config),
            None => GovernedDispatcher::try_with_config(self.config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_basic_functionality() {
        let dispatcher = GovernedDispatcher::new();

        let outcome = dispatcher
            .dispatch("chat.send", || WorkOutcome::<_, ApiFailure>::Success("sent"))
            .unwrap();
        assert_eq!(outcome, Outcome::Completed("sent"));

        let outcome = dispatcher
            .dispatch("chat.send", || {
                WorkOutcome::<&str, ApiFailure>::ThrottleSignal(Some(Duration::from_secs(2)))
            })
            .unwrap();
        assert!(outcome.is_throttled());

        let metrics = dispatcher.metrics();
        assert_eq!(metrics.total_completed, 1);
        assert_eq!(metrics.total_throttle_signals, 1);
    }

    #[test]
    fn test_builder() {
        let dispatcher = GovernorBuilder::new()
            .default_retry_after_secs(12)
            .overwrite_policy(OverwritePolicy::LongestWaitWins)
            .build();

        assert_eq!(dispatcher.config().default_retry_after, Duration::from_secs(12));
        assert_eq!(dispatcher.ledger().policy(), OverwritePolicy::LongestWaitWins);
    }

    #[test]
    fn test_builder_validation() {
        let result = GovernorBuilder::new().default_retry_after(Duration::ZERO).try_build();
        assert_eq!(result.unwrap_err(), ConfigError::ZeroDefaultRetryAfter);
    }

    #[test]
    fn test_builder_shared_ledger() {
        let ledger: SharedLedger = Arc::new(RateLimitLedger::new());
        let a = GovernorBuilder::new().shared_ledger(ledger.clone()).build();
        let b = GovernorBuilder::new()
            .shared_ledger(ledger.clone())
            .overwrite_policy(OverwritePolicy::LongestWaitWins)
            .build();

        assert!(Arc::ptr_eq(a.ledger(), b.ledger()));
        assert_eq!(b.config().overwrite_policy, OverwritePolicy::LastSignalWins);
    }

    #[test]
    fn test_thread_safety() {
        let dispatcher = GovernedDispatcher::new();
        let mut handles = vec![];

        for thread_id in 0..8 {
            let dispatcher = dispatcher.clone();
            handles.push(thread::spawn(move || {
                let operation = format!("op_{}", thread_id);
                let mut completed = 0;
                for _ in 0..100 {
                    let outcome = dispatcher
                        .dispatch(&operation, || WorkOutcome::<_, ApiFailure>::Success(()))
                        .unwrap();
                    if !outcome.is_throttled() {
                        completed += 1;
                    }
                }
                completed
            }));
        }

        let total: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 800);
        assert_eq!(dispatcher.metrics().total_dispatched, 800);
    }

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let _dispatcher = GovernedDispatcher::new();
        let _builder = GovernorBuilder::default();
        let _config = GovernorConfig::default();
        let _policy = OverwritePolicy::LastSignalWins;
        let _ledger: SharedLedger = std::sync::Arc::new(RateLimitLedger::new());
    }

    #[test]
    fn test_constants() {
        assert!(!VERSION.is_empty());
        assert_eq!(MSRV, "1.70.0");
        assert_eq!(DEFAULT_RETRY_AFTER, Duration::from_secs(30));
        assert_eq!(RATELIMITED_MARKER, "ratelimited");
        assert_eq!(TOO_MANY_REQUESTS, 429);
    }
}
