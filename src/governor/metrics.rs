//! # Dispatch Metrics
//!
//! Counters describing what a governed dispatcher has done so far, and a
//! snapshot type for reading them.
//!
//! ```text
//!     dispatched ──┬──► short-circuited        (cooldown pending, work skipped)
//!                  └──► executed ──┬──► completed
//!                                  ├──► throttle signal  (cooldown recorded)
//!                                  └──► failure propagated
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by a dispatcher.
///
/// Updated with relaxed atomics; a snapshot may be slightly out of date under
/// concurrent dispatch but each counter is individually exact.
#[derive(Debug, Default)]
pub(crate) struct DispatchCounters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    short_circuited: AtomicU64,
    throttle_signals: AtomicU64,
    failures: AtomicU64,
}

impl DispatchCounters {
    #[inline]
    pub(crate) fn on_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn on_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn on_short_circuit(&self) {
        self.short_circuited.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn on_throttle_signal(&self) {
        self.throttle_signals.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn on_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DispatchMetrics {
        DispatchMetrics {
            total_dispatched: self.dispatched.load(Ordering::Relaxed),
            total_completed: self.completed.load(Ordering::Relaxed),
            total_short_circuited: self.short_circuited.load(Ordering::Relaxed),
            total_throttle_signals: self.throttle_signals.load(Ordering::Relaxed),
            total_failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of a dispatcher's counters.
///
/// ## Example
///
/// ```rust
/// use callgate::{GovernedDispatcher, WorkOutcome};
///
/// let dispatcher = GovernedDispatcher::new();
/// let _ = dispatcher.dispatch("users_list", || WorkOutcome::<_, ()>::Success(1));
///
/// let metrics = dispatcher.metrics();
/// assert_eq!(metrics.total_dispatched, 1);
/// assert_eq!(metrics.total_completed, 1);
/// println!("{}", metrics.summary());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchMetrics {
    /// Calls to `dispatch`.
    pub total_dispatched: u64,

    /// Calls whose unit of work ran and returned a value.
    pub total_completed: u64,

    /// Calls rejected up front because a cooldown was pending.
    pub total_short_circuited: u64,

    /// Calls whose unit of work reported a throttle signal.
    pub total_throttle_signals: u64,

    /// Calls whose unit of work failed for an unrelated reason.
    pub total_failures: u64,
}

impl DispatchMetrics {
    /// Calls that returned a throttled outcome, whichever way.
    #[inline]
    pub fn total_throttled(&self) -> u64 {
        self.total_short_circuited + self.total_throttle_signals
    }

    /// Calls where the unit of work actually ran.
    #[inline]
    pub fn total_executed(&self) -> u64 {
        self.total_completed + self.total_throttle_signals + self.total_failures
    }

    /// Fraction of dispatched calls that came back throttled (0.0 to 1.0).
    pub fn throttle_ratio(&self) -> f64 {
        if self.total_dispatched == 0 {
            0.0
        } else {
            self.total_throttled() as f64 / self.total_dispatched as f64
        }
    }

    /// Human-readable multi-line summary.
    pub fn summary(&self) -> String {
        format!(
            "Dispatch Metrics:\n\
             ├─ Dispatched: {}\n\
             ├─ Completed: {}\n\
             ├─ Throttled: {} ({:.1}%)\n\
             │  ├─ Short-circuited: {}\n\
             │  └─ Signals observed: {}\n\
             └─ Failures propagated: {}",
            self.total_dispatched,
            self.total_completed,
            self.total_throttled(),
            self.throttle_ratio() * 100.0,
            self.total_short_circuited,
            self.total_throttle_signals,
            self.total_failures
        )
    }
}

impl fmt::Display for DispatchMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
