//! Reconnection Policy
//!
//! Bounded, interval-based reconnection for the feed connection. Attempts
//! fire at a fixed interval (optionally jittered) and stop once the attempt
//! budget is exhausted; a successful open resets the budget.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Fixed interval between attempts.
    pub interval: Duration,
    /// Jitter factor as a fraction (e.g. 0.1 = ±10% randomization; 0 = none).
    pub jitter_factor: f64,
    /// Maximum number of attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            jitter_factor: 0.0,
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(interval: Duration, jitter_factor: f64, max_attempts: u32) -> Self {
        Self {
            interval,
            jitter_factor,
            max_attempts,
        }
    }

    /// Create configuration from [`crate::StreamSettings`].
    #[must_use]
    pub const fn from_stream_settings(settings: &crate::StreamSettings) -> Self {
        Self {
            interval: settings.reconnect_interval,
            jitter_factor: settings.reconnect_jitter,
            max_attempts: settings.max_reconnect_attempts,
        }
    }
}

/// Reconnection policy tracking the attempt budget.
///
/// # Example
///
/// ```rust
/// use market_stream_client::ReconnectConfig;
/// use market_stream_client::ReconnectPolicy;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// // Get delay for the first attempt
/// let delay = policy.next_delay();
/// assert!(delay.is_some());
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Get the delay before the next attempt, consuming one unit of budget.
    ///
    /// Returns `None` if the attempt budget is exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts {
            return None;
        }

        self.attempt_count += 1;
        Some(self.apply_jitter(self.config.interval))
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Get the configured attempt budget (0 = unlimited).
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Check if reconnection should continue.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Apply jitter to a duration.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
