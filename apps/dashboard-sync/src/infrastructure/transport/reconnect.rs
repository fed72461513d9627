//! Reconnection Policy
//!
//! Delay schedule and attempt bound for WebSocket reconnection. The default
//! is a fixed interval; a multiplier above 1.0 turns it into exponential
//! backoff capped at `max_delay`, optionally with jitter.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::WebSocketSettings;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt (1.0 = fixed).
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(3_000), 5)
    }
}

impl ReconnectConfig {
    /// Create a fixed-interval configuration without jitter.
    #[must_use]
    pub const fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay: interval,
            max_delay: interval,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    /// Create an exponential backoff configuration with ±10% jitter.
    #[must_use]
    pub const fn exponential(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor: 0.1,
            max_attempts,
        }
    }

    /// Create configuration from `WebSocketSettings`.
    #[must_use]
    pub fn from_websocket_settings(settings: &WebSocketSettings) -> Self {
        if settings.reconnect_multiplier > 1.0 {
            Self::exponential(
                settings.reconnect_interval,
                settings.reconnect_delay_max.max(settings.reconnect_interval),
                settings.reconnect_multiplier,
                settings.max_reconnect_attempts,
            )
        } else {
            Self::fixed(settings.reconnect_interval, settings.max_reconnect_attempts)
        }
    }
}

/// Reconnection policy yielding one delay per attempt until the bound.
///
/// # Example
///
/// ```rust
/// use dashboard_sync::infrastructure::transport::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_secs(3), 2));
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(3)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(3)));
/// assert_eq!(policy.next_delay(), None);
///
/// // A successful connection starts a fresh budget.
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Get the delay before the next attempt and count the attempt.
    ///
    /// Returns `None` once max attempts have been used.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        self.attempt_count += 1;

        let delay_with_jitter = self.apply_jitter(self.current_delay);

        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        self.current_delay = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));

        Some(delay_with_jitter)
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Get the configured attempt bound (0 = unlimited).
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Check if reconnection should continue.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_fixed_three_seconds_five_attempts() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(3));
        assert!((config.multiplier - 1.0).abs() < f64::EPSILON);
        assert!(config.jitter_factor.abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 5);
    }

    #[test]
    fn fixed_interval_never_grows() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_millis(250), 0));

        for _ in 0..10 {
            assert_eq!(policy.next_delay(), Some(Duration::from_millis(250)));
        }
    }

    #[test]
    fn exponential_backoff_capped() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            jitter_factor: 0.0,
            ..ReconnectConfig::exponential(
                Duration::from_millis(100),
                Duration::from_millis(300),
                2.0,
                0,
            )
        });

        assert_eq!(policy.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(300)));
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(300)));
    }

    #[test]
    fn stops_after_max_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_millis(10), 3));

        for attempt in 1..=3 {
            assert!(policy.next_delay().is_some());
            assert_eq!(policy.attempt_count(), attempt);
        }

        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());
        assert_eq!(policy.attempt_count(), 3);
    }

    #[test]
    fn reset_restores_budget() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_millis(10), 1));
        let _ = policy.next_delay();
        assert!(!policy.should_retry());

        policy.reset();

        assert!(policy.should_retry());
        assert_eq!(policy.next_delay(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn jitter_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig::exponential(
                Duration::from_millis(1000),
                Duration::from_secs(10),
                2.0,
                0,
            ));

            let millis = policy.next_delay().unwrap().as_millis();

            assert!(millis >= 900, "delay {millis}ms is below minimum 900ms");
            assert!(millis <= 1100, "delay {millis}ms is above maximum 1100ms");
        }
    }

    #[test]
    fn from_settings_picks_schedule() {
        let fixed = ReconnectConfig::from_websocket_settings(&WebSocketSettings::default());
        assert_eq!(fixed.initial_delay, Duration::from_millis(3_000));
        assert_eq!(fixed.max_attempts, 5);

        let backoff = ReconnectConfig::from_websocket_settings(&WebSocketSettings {
            reconnect_multiplier: 2.0,
            ..WebSocketSettings::default()
        });
        assert!((backoff.multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(backoff.max_delay, Duration::from_secs(30));
    }
}
