//! # Time Utilities (utils.rs)
//!
//! Helpers for converting between the ledger's monotonic instants and what
//! callers see: whole seconds to wait and a wall-clock ETA.
//!
//! ```text
//!     Ledger (monotonic)           Caller (display)
//!     ──────────────────           ────────────────
//!     next_allowed: Instant  ──►   retry_after: 2           (ceil of 1.93s)
//!     now:          Instant        eta: 2026-10-15T09:12:04.517Z
//! ```
//!
//! The ledger only ever stores `Instant`s so that wall-clock jumps can't
//! extend or cut short a cooldown. Wall-clock time is derived at the moment an
//! outcome is produced.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

/// Rounds a wait up to whole seconds for display.
///
/// A positive wait never rounds to zero; a caller told "0 seconds" would
/// retry immediately and be throttled again.
///
/// ```rust
/// use callgate::display_seconds;
/// use std::time::Duration;
///
/// assert_eq!(display_seconds(Duration::from_millis(1900)), 2);
/// assert_eq!(display_seconds(Duration::from_millis(1)), 1);
/// assert_eq!(display_seconds(Duration::from_secs(5)), 5);
/// assert_eq!(display_seconds(Duration::ZERO), 0);
/// ```
#[inline]
pub fn display_seconds(wait: Duration) -> u64 {
    let whole = wait.as_secs();
    if wait.subsec_nanos() > 0 {
        whole.saturating_add(1)
    } else {
        whole
    }
}

/// Returns the wall-clock instant `wait` from now.
///
/// Saturates at the latest representable timestamp rather than overflowing.
#[inline]
pub fn wall_clock_eta(wait: Duration) -> DateTime<Utc> {
    eta_from(Utc::now(), wait)
}

/// Adds `wait` to a wall-clock base, saturating on overflow.
pub(crate) fn eta_from(base: DateTime<Utc>, wait: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(wait)
        .ok()
        .and_then(|delta| base.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Formats an ETA as an RFC 3339 UTC timestamp with millisecond precision.
///
/// ```rust
/// use callgate::format_eta;
/// use chrono::{TimeZone, Utc};
///
/// let eta = Utc.with_ymd_and_hms(2026, 10, 15, 9, 12, 4).unwrap();
/// assert_eq!(format_eta(&eta), "2026-10-15T09:12:04.000Z");
/// ```
#[inline]
pub fn format_eta(eta: &DateTime<Utc>) -> String {
    eta.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_display_seconds_rounds_up() {
        assert_eq!(display_seconds(Duration::from_millis(100)), 1);
        assert_eq!(display_seconds(Duration::from_millis(1900)), 2);
        assert_eq!(display_seconds(Duration::from_millis(2000)), 2);
        assert_eq!(display_seconds(Duration::from_millis(2001)), 3);
        assert_eq!(display_seconds(Duration::from_nanos(1)), 1);
    }

    #[test]
    fn test_display_seconds_zero() {
        assert_eq!(display_seconds(Duration::ZERO), 0);
    }

    #[test]
    fn test_eta_from_adds_wait() {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let eta = eta_from(base, Duration::from_millis(2500));
        assert_eq!(format_eta(&eta), "2026-01-01T00:00:02.500Z");
    }

    #[test]
    fn test_eta_from_saturates() {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let eta = eta_from(base, Duration::from_secs(u64::MAX));
        assert_eq!(eta, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_wall_clock_eta_is_in_future() {
        let before = Utc::now();
        let eta = wall_clock_eta(Duration::from_secs(10));
        assert!(eta > before);
        assert!(eta <= Utc::now() + chrono::Duration::seconds(10));
    }
}
