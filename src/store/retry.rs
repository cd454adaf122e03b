//! Retry policy configuration for node phases.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Delay before the attempt following `attempt` (1-based).
pub type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// How often and how patiently the store retries a failing operation.
///
/// # Backoff Calculation
///
/// [`RetryPolicy::exponential`] waits `min(base * 2^(N-1), cap)` after
/// failed attempt N:
///
/// ```
/// use std::time::Duration;
/// use waypoint::store::RetryPolicy;
///
/// let policy = RetryPolicy::exponential(4, Duration::from_millis(100), Duration::from_millis(250));
/// assert_eq!(policy.delay_for(1), Duration::from_millis(100));
/// assert_eq!(policy.delay_for(2), Duration::from_millis(200));
/// assert_eq!(policy.delay_for(3), Duration::from_millis(250));
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one. Never below 1.
    pub max_attempts: u32,
    delay: DelayFn,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate(3)
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Retry without waiting.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::custom(max_attempts, |_| Duration::ZERO)
    }

    /// Run exactly once.
    pub fn never() -> Self {
        Self::immediate(1)
    }

    /// Wait the same amount of time between attempts.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::custom(max_attempts, move |_| delay)
    }

    /// Double the delay after every failure, capped at `cap`.
    pub fn exponential(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self::custom(max_attempts, move |attempt| {
            let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
            base.saturating_mul(multiplier).min(cap)
        })
    }

    /// Caller-supplied delay function keyed by attempt number.
    pub fn custom<F>(max_attempts: u32, delay: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Arc::new(delay),
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        (self.delay)(attempt)
    }

    /// Returns `true` if another attempt should follow failed attempt `attempt`.
    pub fn should_retry(&self, attempt: u32, max_attempts: u32) -> bool {
        attempt < max_attempts.max(1)
    }
}

/// Retry settings as they appear in a configuration file.
///
/// ```
/// use waypoint::store::{RetryPolicy, RetrySettings};
///
/// let settings: RetrySettings = serde_json::from_str(r#"{ "max_attempts": 5 }"#).unwrap();
/// let policy = RetryPolicy::from(settings);
/// assert_eq!(policy.max_attempts, 5);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    /// Delay after the first failure; zero disables waiting
    pub base_delay_ms: u64,
    /// Upper bound for the exponential delay
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 30_000,
        }
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        if settings.base_delay_ms == 0 {
            return RetryPolicy::immediate(settings.max_attempts);
        }
        RetryPolicy::exponential(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms.max(settings.base_delay_ms)),
        )
    }
}
