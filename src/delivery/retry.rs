// src/delivery/retry.rs
//! Exponential backoff between delivery attempts

use crate::utils::config::DeliveryConfig;
use std::time::Duration;

/// Current pacing delay
///
/// Starts at `min`, doubles on each consecutive failure up to `max`, and
/// returns to `min` on any success. The same delay paces sends after a
/// success.
#[derive(Debug, Clone)]
pub struct RetryState {
    min: Duration,
    max: Duration,
    current: Duration,
    consecutive_failures: u32,
}

impl RetryState {
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
            consecutive_failures: 0,
        }
    }

    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self::new(config.min_backoff(), config.max_backoff())
    }

    /// Delay to apply before the next attempt
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Record a failure; returns the delay to wait before retrying
    pub fn escalate(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        delay
    }

    /// Record a success
    pub fn reset(&mut self) {
        self.current = self.min;
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::from_config(&DeliveryConfig::default())
    }
}
