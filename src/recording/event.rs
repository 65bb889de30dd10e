// src/recording/event.rs
//! Event records and per-session default properties

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form event properties
pub type Properties = serde_json::Map<String, Value>;

/// Property keys injected into every event
pub mod default_keys {
    pub const PLATFORM: &str = "platform";
    pub const SESSION_ID: &str = "session_id";
    pub const DEBUG: &str = "debug";
    pub const EXPORT_TEMPLATE: &str = "export_template";
}

/// A single telemetry event
///
/// Serializes to exactly the JSON body the collection endpoint expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event name (bounded length, checked at admission)
    pub name: String,

    /// Stable per-installation player identifier
    pub player_id: u64,

    /// Caller properties merged with session defaults
    pub properties: Properties,

    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl EventRecord {
    /// Build a record stamped with the current time
    pub fn new(
        name: impl Into<String>,
        player_id: u64,
        properties: Option<Properties>,
        session: &SessionContext,
    ) -> Self {
        let mut properties = properties.unwrap_or_default();
        session.inject_defaults(&mut properties);

        Self {
            name: name.into(),
            player_id,
            properties,
            timestamp: now_seconds(),
        }
    }
}

/// Facts about the running process attached to every event
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub platform: String,
    pub session_id: String,
    pub debug_build: bool,
    pub exported: bool,
}

impl SessionContext {
    /// Describe the current process with a fresh session id
    pub fn detect(exported: bool) -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            session_id: ulid::Ulid::new().to_string(),
            debug_build: cfg!(debug_assertions),
            exported,
        }
    }

    /// Add the default keys the caller did not set itself
    pub fn inject_defaults(&self, properties: &mut Properties) {
        properties
            .entry(default_keys::PLATFORM)
            .or_insert_with(|| Value::from(self.platform.clone()));
        properties
            .entry(default_keys::SESSION_ID)
            .or_insert_with(|| Value::from(self.session_id.clone()));
        properties
            .entry(default_keys::DEBUG)
            .or_insert(Value::Bool(self.debug_build));
        properties
            .entry(default_keys::EXPORT_TEMPLATE)
            .or_insert(Value::Bool(self.exported));
    }
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
