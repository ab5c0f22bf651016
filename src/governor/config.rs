//! # Governor Configuration
//!
//! This module provides the configuration structures for the call governor.
//! There are only two knobs: how long to back off when the remote service
//! signals a throttle without saying for how long, and what to do when a new
//! throttle signal arrives while an older cooldown is still pending.
//!
//! ## Overwrite Policy
//!
//! ```text
//!     Pending cooldown:       |---------- 20s ----------|
//!     New signal (5s):        |-- 5s --|
//!
//!     LastSignalWins   ──►    |-- 5s --|                  (default)
//!     LongestWaitWins  ──►    |---------- 20s ----------|
//! ```

use std::time::Duration;
use thiserror::Error;

/// Retry-after applied when a throttle signal carries no usable duration.
///
/// The remote service normally tells us how long to wait. When it doesn't,
/// or the value can't be parsed, we assume half a minute.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// How the ledger resolves a new throttle signal against a pending cooldown.
///
/// ## Example
///
/// ```rust
/// use callgate::{GovernorConfig, OverwritePolicy};
///
/// // Trust the most recent signal from the remote service (default)
/// let config = GovernorConfig::default();
/// assert_eq!(config.overwrite_policy, OverwritePolicy::LastSignalWins);
///
/// // Never let a short signal cut a longer cooldown short
/// let config = GovernorConfig::default()
///     .with_overwrite_policy(OverwritePolicy::LongestWaitWins);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Every signal replaces the stored instant, even if it shortens the wait.
    ///
    /// The remote service is the authority on its own timing, so the latest
    /// thing it told us is what we honor.
    #[default]
    LastSignalWins,

    /// A signal only replaces the stored instant if it pushes it further out.
    LongestWaitWins,
}

/// Errors produced while validating a [`GovernorConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The fallback retry-after must be a positive duration.
    #[error("default_retry_after must be greater than zero")]
    ZeroDefaultRetryAfter,
}

/// Configuration for a governed dispatcher and its ledger.
///
/// ## Examples
///
/// ```rust
/// use callgate::GovernorConfig;
/// use std::time::Duration;
///
/// // 30 second fallback, last signal wins
/// let config = GovernorConfig::default();
///
/// // Shorter fallback for a service that always sends Retry-After anyway
/// let config = GovernorConfig::default()
///     .with_default_retry_after(Duration::from_secs(10));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Cooldown applied when a throttle signal has no usable duration.
    pub default_retry_after: Duration,

    /// How concurrent or successive throttle signals are merged.
    pub overwrite_policy: OverwritePolicy,
}

impl Default for GovernorConfig {
    /// 30 second fallback retry-after, last signal wins.
    fn default() -> Self {
        Self {
            default_retry_after: DEFAULT_RETRY_AFTER,
            overwrite_policy: OverwritePolicy::default(),
        }
    }
}

impl GovernorConfig {
    /// Creates a configuration with the given fallback retry-after.
    pub fn new(default_retry_after: Duration) -> Self {
        Self {
            default_retry_after,
            overwrite_policy: OverwritePolicy::default(),
        }
    }

    /// Sets the fallback retry-after.
    pub fn with_default_retry_after(mut self, retry_after: Duration) -> Self {
        self.default_retry_after = retry_after;
        self
    }

    /// Sets the overwrite policy.
    pub fn with_overwrite_policy(mut self, policy: OverwritePolicy) -> Self {
        self.overwrite_policy = policy;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroDefaultRetryAfter`] if the fallback
    /// retry-after is zero, since a zero cooldown would let a throttled
    /// operation be called again immediately.
    ///
    /// ```rust
    /// use callgate::GovernorConfig;
    /// use std::time::Duration;
    ///
    /// let config = GovernorConfig::new(Duration::ZERO);
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_retry_after.is_zero() {
            return Err(ConfigError::ZeroDefaultRetryAfter);
        }
        Ok(())
    }
}
