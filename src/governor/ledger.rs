//! # Rate-Limit Ledger
//!
//! This module stores, per operation identifier, the earliest instant at which
//! that operation may be called again. It is pure state: no I/O, no sleeping,
//! no retries. The [`GovernedDispatcher`](super::GovernedDispatcher) is the
//! only writer in normal operation.
//!
//! ## Architecture
//!
//! ```text
//!     Operation identifiers:
//!     chat_postMessage ────┐
//!     conversations_list ──┼──► Ledger ──► next-allowed Instant
//!     users_list ──────────┘        │
//!                                   ▼
//!                          ┌──────────────────┐
//!                          │  DashMap shards  │
//!                          │  ┌────────────┐  │
//!                          │  │ op → t₁    │  │
//!                          │  │ op → t₂    │  │
//!                          │  └────────────┘  │
//!                          └──────────────────┘
//! ```
//!
//! ## Entry Lifecycle
//!
//! 1. **Absent**: the operation has never been throttled
//! 2. **Pending**: `now < next_allowed`, calls are short-circuited
//! 3. **Inert**: `next_allowed` is in the past, calls go through
//!
//! Entries are created on the first throttle signal and overwritten by later
//! ones. They are never removed; an inert entry behaves exactly like an absent
//! one.

use super::{
    config::OverwritePolicy,
    utils::{display_seconds, eta_from},
};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Upper bound on a single cooldown.
///
/// Retry-after values come from the remote service and are otherwise
/// unbounded. Anything beyond a day is clamped so `Instant` arithmetic can't
/// overflow.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

/// One consistent reading of a pending ledger entry.
///
/// `wait` and `eta` are derived from the same read of the stored instant, so
/// `eta == now + wait` holds for the moment the snapshot was taken. It is not
/// re-evaluated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitSnapshot {
    /// Time remaining until the operation may be called again.
    pub wait: Duration,

    /// Wall-clock instant at which the cooldown ends.
    pub eta: DateTime<Utc>,
}

impl LimitSnapshot {
    /// Snapshot of a cooldown ending at `next_allowed`, or `None` if it has
    /// already ended.
    pub(crate) fn until(next_allowed: Instant) -> Option<Self> {
        let wait = next_allowed.checked_duration_since(Instant::now())?;
        if wait.is_zero() {
            return None;
        }
        Some(Self {
            wait,
            eta: eta_from(Utc::now(), wait),
        })
    }

    /// The remaining wait rounded up to whole seconds.
    #[inline]
    pub fn retry_after_secs(&self) -> u64 {
        display_seconds(self.wait)
    }
}

/// Thread-safe map from operation identifier to next-allowed instant.
///
/// The map is sharded, so two threads working on different operations
/// usually don't contend at all, and every critical section is a single O(1)
/// map access. No lock is held while a unit of work runs.
///
/// ## Example
///
/// ```rust
/// use callgate::RateLimitLedger;
/// use std::time::Duration;
///
/// let ledger = RateLimitLedger::new();
/// assert!(ledger.is_limited("chat.send").is_none());
///
/// ledger.set_limit("chat.send", Duration::from_secs(2));
///
/// let wait = ledger.is_limited("chat.send").unwrap();
/// assert!(wait <= Duration::from_secs(2));
/// assert!(ledger.eta_of("chat.send").is_some());
/// ```
pub struct RateLimitLedger {
    /// Operation identifier to earliest next-allowed instant.
    entries: DashMap<String, Instant, ahash::RandomState>,

    /// How a new signal is merged with a pending one.
    policy: OverwritePolicy,

    /// Total number of throttle signals recorded since construction.
    total_signals: AtomicU64,
}

impl RateLimitLedger {
    /// Creates an empty ledger where the last signal wins.
    pub fn new() -> Self {
        Self::with_policy(OverwritePolicy::default())
    }

    /// Creates an empty ledger with the given overwrite policy.
    pub fn with_policy(policy: OverwritePolicy) -> Self {
        Self {
            entries: DashMap::with_hasher(ahash::RandomState::new()),
            policy,
            total_signals: AtomicU64::new(0),
        }
    }

    /// Returns the overwrite policy this ledger was built with.
    #[inline]
    pub fn policy(&self) -> OverwritePolicy {
        self.policy
    }

    /// Returns the remaining wait if `operation` is cooling down.
    ///
    /// Returns `None` if the operation was never throttled or its cooldown
    /// has already elapsed.
    #[inline]
    pub fn is_limited(&self, operation: &str) -> Option<Duration> {
        let next_allowed = self.next_allowed(operation)?;
        next_allowed.checked_duration_since(Instant::now()).filter(|wait| !wait.is_zero())
    }

    /// Returns the wall-clock time at which `operation` may be called again,
    /// or `None` if it isn't cooling down.
    pub fn eta_of(&self, operation: &str) -> Option<DateTime<Utc>> {
        self.snapshot(operation).map(|snapshot| snapshot.eta)
    }

    /// Reads the entry for `operation` once and derives both the remaining
    /// wait and the ETA from that single read.
    ///
    /// Returns `None` if the operation isn't cooling down.
    pub fn snapshot(&self, operation: &str) -> Option<LimitSnapshot> {
        self.next_allowed(operation).and_then(LimitSnapshot::until)
    }

    /// Records a throttle signal: `operation` may not be called for
    /// `retry_after`.
    ///
    /// Under [`OverwritePolicy::LastSignalWins`] this always replaces any
    /// pending cooldown. Under [`OverwritePolicy::LongestWaitWins`] a pending
    /// cooldown that ends later than the new one is kept.
    ///
    /// Returns the next-allowed instant actually stored.
    pub fn set_limit(&self, operation: &str, retry_after: Duration) -> Instant {
        let retry_after = if retry_after > MAX_COOLDOWN {
            warn!(
                "Clamping retry-after of {}s for {} to {}s",
                retry_after.as_secs(),
                operation,
                MAX_COOLDOWN.as_secs()
            );
            MAX_COOLDOWN
        } else {
            retry_after
        };

        let candidate = Instant::now() + retry_after;
        self.total_signals.fetch_add(1, Ordering::Relaxed);

        // The shard lock is released at the end of this match; log afterwards.
        let (stored, previous) = match self.entries.entry(operation.to_owned()) {
            Entry::Vacant(vacant) => {
                vacant.insert(candidate);
                (candidate, None)
            }
            Entry::Occupied(mut occupied) => {
                let current = *occupied.get();
                match self.policy {
                    OverwritePolicy::LongestWaitWins if current > candidate => {
                        (current, Some(current))
                    }
                    _ => {
                        occupied.insert(candidate);
                        (candidate, Some(current))
                    }
                }
            }
        };

        match previous {
            None => debug!("First throttle signal for {} ({:?})", operation, retry_after),
            Some(current) if current == stored && current != candidate => {
                debug!("Keeping longer pending cooldown for {}", operation)
            }
            Some(_) => debug!("Updated cooldown for {} ({:?})", operation, retry_after),
        }

        stored
    }

    /// Returns the number of operations that have ever been throttled.
    ///
    /// Includes inert entries whose cooldown already elapsed.
    #[inline]
    pub fn tracked_operations(&self) -> usize {
        self.entries.len()
    }

    /// Returns every operation currently cooling down, sorted by identifier.
    pub fn limited_operations(&self) -> Vec<(String, LimitSnapshot)> {
        let mut limited: Vec<(String, LimitSnapshot)> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let next_allowed = *entry.value();
                LimitSnapshot::until(next_allowed).map(|snapshot| (entry.key().clone(), snapshot))
            })
            .collect();

        limited.sort_by(|a, b| a.0.cmp(&b.0));
        limited
    }

    /// Returns summary statistics about the ledger.
    pub fn stats(&self) -> LedgerStats {
        let now = Instant::now();
        let currently_limited = self
            .entries
            .iter()
            .filter(|entry| *entry.value() > now)
            .count();

        LedgerStats {
            tracked_operations: self.entries.len(),
            currently_limited,
            total_signals: self.total_signals.load(Ordering::Relaxed),
        }
    }

    /// Copies the stored instant out of the map.
    ///
    /// The shard lock is held only for the duration of the copy.
    #[inline]
    fn next_allowed(&self, operation: &str) -> Option<Instant> {
        self.entries.get(operation).map(|entry| *entry.value())
    }
}

impl Default for RateLimitLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimitLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitLedger")
            .field("tracked_operations", &self.tracked_operations())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Statistics for a [`RateLimitLedger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStats {
    /// Operations that have ever been throttled.
    pub tracked_operations: usize,

    /// Operations whose cooldown has not yet elapsed.
    pub currently_limited: usize,

    /// Throttle signals recorded since construction.
    pub total_signals: u64,
}

impl std::fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ledger: {} tracked, {} limited, {} signals",
            self.tracked_operations, self.currently_limited, self.total_signals
        )
    }
}
