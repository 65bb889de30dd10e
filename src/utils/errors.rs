// src/utils/errors.rs
//! Crate-wide error type
//!
//! Only startup and explicit queries surface these to the host. Failures on
//! the admission and delivery paths are resolved internally (drop, retry or
//! disk write) and logged instead.

use thiserror::Error;

/// Errors raised by the telemetry pipeline
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Snapshot or consent storage failed
    #[error("Storage failed: {0}")]
    StorageFailed(String),

    /// Event serialization or deserialization failed
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Snapshot compression failed
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    /// Logging or metrics initialization failed
    #[error("Observability setup failed: {0}")]
    ObservabilityFailed(String),

    /// The background service has stopped and no longer accepts commands
    #[error("Telemetry service is not running")]
    ServiceStopped,
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
