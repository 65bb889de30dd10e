// src/admission/rate_limiter.rs
//! Fixed-window admission ceiling
//!
//! This is a runaway-loop guard, not traffic shaping: once a window has
//! admitted its quota, every further event in that window is dropped.

use crate::utils::config::LimitsConfig;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Counts admissions per window
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    window_start: Instant,
    count_in_window: u32,
}

impl RateLimiter {
    /// Create a limiter whose first window starts now
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self::starting_at(max_per_window, window, Instant::now())
    }

    pub fn starting_at(max_per_window: u32, window: Duration, now: Instant) -> Self {
        Self {
            max_per_window,
            window,
            window_start: now,
            count_in_window: 0,
        }
    }

    pub fn from_config(limits: &LimitsConfig) -> Self {
        Self::new(limits.max_events_per_window, limits.window())
    }

    /// Try to admit one event now
    pub fn try_admit(&mut self) -> bool {
        self.try_admit_at(Instant::now())
    }

    /// Try to admit one event at `now`
    pub fn try_admit_at(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) > self.window {
            self.window_start = now;
            self.count_in_window = 0;
        }

        self.count_in_window = self.count_in_window.saturating_add(1);
        if self.count_in_window > self.max_per_window {
            warn!(
                "Rate limit of {} events per {:?} exceeded, dropping event",
                self.max_per_window, self.window
            );
            return false;
        }
        true
    }

    /// Attempts counted in the current window
    pub fn count_in_window(&self) -> u32 {
        self.count_in_window
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&LimitsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifty_one_in_one_window() {
        let start = Instant::now();
        let mut limiter = RateLimiter::starting_at(50, Duration::from_secs(60), start);

        let admitted = (0..51)
            .filter(|i| limiter.try_admit_at(start + Duration::from_millis(*i as u64 * 100)))
            .count();

        assert_eq!(admitted, 50);
    }

    #[test]
    fn test_new_window_after_sixty_seconds() {
        let start = Instant::now();
        let mut limiter = RateLimiter::starting_at(50, Duration::from_secs(60), start);

        for _ in 0..50 {
            assert!(limiter.try_admit_at(start));
        }
        assert!(!limiter.try_admit_at(start + Duration::from_secs(59)));

        // Exactly 60s is still inside the window
        assert!(!limiter.try_admit_at(start + Duration::from_secs(60)));

        assert!(limiter.try_admit_at(start + Duration::from_millis(60_001)));
        assert_eq!(limiter.count_in_window(), 1);
    }

    #[test]
    fn test_rejections_do_not_extend_window() {
        let start = Instant::now();
        let mut limiter = RateLimiter::starting_at(2, Duration::from_secs(60), start);

        assert!(limiter.try_admit_at(start));
        assert!(limiter.try_admit_at(start));
        for s in 1..60 {
            assert!(!limiter.try_admit_at(start + Duration::from_secs(s)));
        }
        assert!(limiter.try_admit_at(start + Duration::from_secs(61)));
    }
}
