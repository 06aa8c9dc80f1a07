//! Retry policy implementation

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for delivery retries
///
/// Backoff is a pure function of the attempt number, so the schedule can be
/// inspected and tested without sleeping.
///
/// # Example
///
/// ```
/// use events_core::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::delivery();
///
/// // No wait before the first attempt
/// assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
/// // 10ms before the second, then doubling
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(10));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(20));
/// // Capped at 10 seconds
/// assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including initial)
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    /// Maximum delay between attempts
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Backoff multiplier applied after every failed attempt
    pub backoff_coefficient: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::delivery()
    }
}

impl RetryPolicy {
    /// Policy used for event delivery
    ///
    /// - 20 max attempts
    /// - 10 millisecond initial interval
    /// - 10 second max interval
    /// - 2x backoff coefficient
    pub fn delivery() -> Self {
        Self {
            max_attempts: 20,
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(10),
            backoff_coefficient: 2,
        }
    }

    /// Create a policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            backoff_coefficient: 1,
        }
    }

    /// Create a policy with fixed intervals (no backoff)
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_interval: interval,
            max_interval: interval,
            backoff_coefficient: 1,
        }
    }

    /// Calculate delay before a given attempt number (1-based)
    ///
    /// Attempt 1 has no delay. Attempt `n > 1` waits
    /// `initial_interval * coefficient^(n - 2)`, capped at `max_interval`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let retry_num = attempt - 2;
        let base = self
            .backoff_coefficient
            .checked_pow(retry_num)
            .and_then(|factor| self.initial_interval.checked_mul(factor))
            .unwrap_or(self.max_interval);

        base.min(self.max_interval)
    }

    /// Check if there are remaining attempts
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }

    /// Total time spent waiting between attempts when every attempt fails
    pub fn total_backoff(&self) -> Duration {
        (2..=self.max_attempts)
            .map(|attempt| self.delay_for_attempt(attempt))
            .sum()
    }

    /// Upper bound on one delivery when each attempt may take `per_attempt`
    ///
    /// Used to size claim leases so a slow delivery is not re-claimed
    /// while still in flight.
    pub fn worst_case_duration(&self, per_attempt: Duration) -> Duration {
        per_attempt.saturating_mul(self.max_attempts) + self.total_backoff()
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
