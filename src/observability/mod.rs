// src/observability/mod.rs
//! Logging setup and metric names
//!
//! Logging goes through `tracing`; the host decides whether to install our
//! subscriber (`init_tracing`) or its own. Counters go through the `metrics`
//! facade and are no-ops until the host installs a recorder.

use crate::utils::config::LoggingConfig;
use crate::utils::errors::{Result, TelemetryError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable overriding the configured log filter
pub const LOG_ENV: &str = "GAME_TELEMETRY_LOG";

/// Install the global tracing subscriber
///
/// `GAME_TELEMETRY_LOG` takes precedence over `config.filter`. Fails if a
/// global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| TelemetryError::ObservabilityFailed(format!("Invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .try_init()
    };

    result.map_err(|e| TelemetryError::ObservabilityFailed(format!("Failed to install subscriber: {}", e)))
}

/// Counter names emitted by the pipeline
pub mod metric_names {
    pub const EVENTS_ADMITTED: &str = "telemetry_events_admitted_total";
    pub const EVENTS_REJECTED: &str = "telemetry_events_rejected_total";
    pub const EVENTS_DELIVERED: &str = "telemetry_events_delivered_total";
    pub const EVENTS_DROPPED: &str = "telemetry_events_dropped_total";
    pub const DELIVERY_FAILURES: &str = "telemetry_delivery_failures_total";
    pub const EVENTS_PERSISTED: &str = "telemetry_events_persisted_total";
    pub const EVENTS_RESTORED: &str = "telemetry_events_restored_total";
}

/// Label values for `EVENTS_REJECTED`
pub mod reject_reasons {
    pub const DISABLED: &str = "collection_disabled";
    pub const NAME_TOO_LONG: &str = "name_too_long";
    pub const RATE_LIMITED: &str = "rate_limited";
}

