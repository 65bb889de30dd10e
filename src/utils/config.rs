// src/utils/config.rs
//! Layered pipeline configuration
//!
//! Values come from an optional config file (path taken from
//! `GAME_TELEMETRY_CONFIG`, default `telemetry.toml`) overlaid with
//! environment variables such as `GAME_TELEMETRY__SERVER__AUTH_TOKEN`.
//! Every field has a default so an empty environment yields a usable (but
//! disabled, since no auth token is set) pipeline.

use crate::utils::errors::{Result, TelemetryError};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "GAME_TELEMETRY_CONFIG";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "GAME_TELEMETRY";

/// Longest delay any timer may be configured with
pub const MAX_DELAY_SECS: u64 = 86_400;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub server: ServerConfig,
    pub consent: ConsentConfig,
    pub events: EventConfig,
    pub delivery: DeliveryConfig,
    pub limits: LimitsConfig,
    pub heartbeat: HeartbeatConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

/// Collection endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the collection server
    pub url: String,

    /// Project auth token; collection is disabled while empty
    pub auth_token: String,

    /// Upper bound for a single request
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            auth_token: String::new(),
            request_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Consent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentConfig {
    /// Whether the player must opt in before anything is collected
    pub required: bool,

    /// Where consent and player identity are persisted
    pub config_file_path: PathBuf,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            required: false,
            config_file_path: PathBuf::from("telemetry/consent.json"),
        }
    }
}

/// Built-in event behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub auto_add_event_on_launch: bool,
    pub auto_add_event_on_quit: bool,
    pub launch_event_name: String,
    pub quit_event_name: String,

    /// Reported as the `export_template` default property
    pub exported_build: bool,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            auto_add_event_on_launch: true,
            auto_add_event_on_quit: true,
            launch_event_name: "game_launched".to_string(),
            quit_event_name: "game_quit".to_string(),
            exported_build: false,
        }
    }
}

/// Retry pacing, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub min_backoff_secs: f64,
    pub max_backoff_secs: f64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            min_backoff_secs: 2.0,
            max_backoff_secs: 120.0,
        }
    }
}

impl DeliveryConfig {
    /// Out-of-range values saturate; `validate` rejects them first
    pub fn min_backoff(&self) -> Duration {
        bounded_delay(self.min_backoff_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        bounded_delay(self.max_backoff_secs)
    }
}

fn bounded_delay(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs)
        .unwrap_or(Duration::ZERO)
        .min(Duration::from_secs(MAX_DELAY_SECS))
}

/// Hard ceilings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Events admitted per rate window
    pub max_events_per_window: u32,

    pub window_secs: u64,

    /// Longest accepted event name, in characters
    pub max_name_len: usize,

    /// Most records kept in a disk snapshot (oldest dropped first)
    pub max_persisted_events: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_events_per_window: 50,
            window_secs: 60,
            max_name_len: 50,
            max_persisted_events: 200,
        }
    }
}

impl LimitsConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Quit heartbeat schedule, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub initial_secs: u64,
    pub step_secs: u64,
    pub max_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            initial_secs: 10,
            step_secs: 10,
            max_secs: 60,
        }
    }
}

/// Disk snapshot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub snapshot_path: PathBuf,

    /// zstd level used for the snapshot file
    pub compression_level: i32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("telemetry/queue.snapshot"),
            compression_level: 3,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `GAME_TELEMETRY_LOG` is unset
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "game_telemetry=info".to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Load from the file named by `GAME_TELEMETRY_CONFIG` plus environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "telemetry.toml".to_string());
        Self::load_from(path)
    }

    /// Load from a specific file plus environment overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| TelemetryError::ConfigError(format!("Failed to read configuration: {}", e)))?;

        let config: TelemetryConfig = settings
            .try_deserialize()
            .map_err(|e| TelemetryError::ConfigError(format!("Invalid configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.url.trim().is_empty() {
            return Err(TelemetryError::ConfigError("server.url cannot be empty".to_string()));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(TelemetryError::ConfigError(
                "server.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        let delivery = &self.delivery;
        let min_backoff = Duration::try_from_secs_f64(delivery.min_backoff_secs).ok();
        if !matches!(min_backoff, Some(d) if !d.is_zero() && d.as_secs() < MAX_DELAY_SECS) {
            return Err(TelemetryError::ConfigError(format!(
                "delivery.min_backoff_secs must be a positive number below {}",
                MAX_DELAY_SECS
            )));
        }
        let max_backoff = Duration::try_from_secs_f64(delivery.max_backoff_secs).ok();
        if !matches!(max_backoff, Some(d) if d.as_secs() <= MAX_DELAY_SECS) {
            return Err(TelemetryError::ConfigError(format!(
                "delivery.max_backoff_secs must be at most {}",
                MAX_DELAY_SECS
            )));
        }
        if delivery.max_backoff_secs < delivery.min_backoff_secs {
            return Err(TelemetryError::ConfigError(
                "delivery.max_backoff_secs must be at least delivery.min_backoff_secs".to_string(),
            ));
        }

        if self.limits.max_events_per_window == 0 || self.limits.window_secs == 0 {
            return Err(TelemetryError::ConfigError(
                "limits.max_events_per_window and limits.window_secs must be greater than 0".to_string(),
            ));
        }
        if self.limits.max_name_len == 0 || self.limits.max_persisted_events == 0 {
            return Err(TelemetryError::ConfigError(
                "limits.max_name_len and limits.max_persisted_events must be greater than 0".to_string(),
            ));
        }

        if self.heartbeat.initial_secs == 0 || self.heartbeat.max_secs < self.heartbeat.initial_secs {
            return Err(TelemetryError::ConfigError(
                "heartbeat.initial_secs must be positive and not exceed heartbeat.max_secs".to_string(),
            ));
        }
        if self.heartbeat.max_secs > MAX_DELAY_SECS || self.heartbeat.step_secs > MAX_DELAY_SECS {
            return Err(TelemetryError::ConfigError(format!(
                "heartbeat intervals must be at most {} seconds",
                MAX_DELAY_SECS
            )));
        }

        for name in [&self.events.launch_event_name, &self.events.quit_event_name] {
            if name.is_empty() || name.chars().count() > self.limits.max_name_len {
                return Err(TelemetryError::ConfigError(format!(
                    "Built-in event name '{}' must be 1..={} characters",
                    name, self.limits.max_name_len
                )));
            }
        }

        Ok(())
    }

    /// Whether an auth token is configured at all
    pub fn has_credentials(&self) -> bool {
        !self.server.auth_token.trim().is_empty()
    }
}
