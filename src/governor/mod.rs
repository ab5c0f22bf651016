//! # Call Governor Module
//!
//! Internal implementation of the call governor, split by concern.
//!
//! ## Module Structure
//!
//! ```text
//!     governor/
//!     ├── mod.rs          (You are here - Module organization)
//!     ├── config.rs       (Fallback retry-after and overwrite policy)
//!     ├── ledger.rs       (Per-operation next-allowed instants)
//!     ├── dispatcher.rs   (Check → execute → interpret → update)
//!     ├── signal.rs       (Payload / HTTP failure classification)
//!     ├── outcome.rs      (Completed vs Throttled results)
//!     ├── metrics.rs      (Dispatch counters)
//!     └── utils.rs        (Display rounding and wall-clock ETAs)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     Caller
//!       │
//!       ▼
//!     ┌────────────┐       ┌─────────┐
//!     │ Dispatcher │ ◄───► │ Ledger  │ ◄── shared, per operation
//!     └─────┬──────┘       └─────────┘
//!           │
//!           ▼
//!     ┌────────────┐
//!     │  Signal    │ ◄── adapts raw remote results
//!     └─────┬──────┘
//!           │
//!           ▼
//!     Unit of work (remote call)
//! ```

mod config;
mod dispatcher;
mod ledger;
mod metrics;
mod outcome;
mod signal;
mod utils;

/// Configuration types for the governor
pub use config::{ConfigError, GovernorConfig, OverwritePolicy, DEFAULT_RETRY_AFTER};

/// The dispatch gate
pub use dispatcher::GovernedDispatcher;

/// Per-operation cooldown state
pub use ledger::{LedgerStats, LimitSnapshot, RateLimitLedger, MAX_COOLDOWN};

/// Counters for observability
pub use metrics::DispatchMetrics;

/// Results of a governed call
pub use outcome::{Outcome, Throttled};

/// Boundary adapters for raw remote results
pub use signal::{
    classify, classify_failure, classify_payload, is_throttle_payload, parse_retry_after,
    payload_retry_after, ApiFailure, HttpFailure, WorkOutcome, RATELIMITED_MARKER,
    RETRY_AFTER_HEADER, TOO_MANY_REQUESTS,
};

/// Time helpers
pub use utils::{display_seconds, format_eta, wall_clock_eta};
