// src/delivery/heartbeat.rs
//! Quit heartbeat
//!
//! Exit notifications are unreliable on some platforms, so the pipeline
//! periodically records a quit event while the game runs. The interval starts
//! short to catch immediate bounces and grows by a fixed step up to a cap.

use crate::utils::config::HeartbeatConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Self-rearming heartbeat timer
#[derive(Debug, Clone)]
pub struct QuitHeartbeat {
    interval: Duration,
    step: Duration,
    max: Duration,
    deadline: Option<Instant>,
    stopped: bool,
}

impl QuitHeartbeat {
    pub fn new(initial: Duration, step: Duration, max: Duration) -> Self {
        Self {
            interval: initial,
            step,
            max: max.max(initial),
            deadline: None,
            stopped: false,
        }
    }

    pub fn from_config(config: &HeartbeatConfig) -> Self {
        Self::new(
            Duration::from_secs(config.initial_secs),
            Duration::from_secs(config.step_secs),
            Duration::from_secs(config.max_secs),
        )
    }

    /// Arm the first firing one interval after `now`
    pub fn start(&mut self, now: Instant) {
        if !self.stopped {
            self.deadline = Some(now + self.interval);
        }
    }

    /// When the heartbeat fires next, if armed
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consume a due firing and re-arm with a longer interval
    ///
    /// Returns false when nothing was due.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.interval = (self.interval + self.step).min(self.max);
                self.deadline = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }

    /// Disarm for good
    pub fn stop(&mut self) {
        self.stopped = true;
        self.deadline = None;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for QuitHeartbeat {
    fn default() -> Self {
        Self::from_config(&HeartbeatConfig::default())
    }
}
