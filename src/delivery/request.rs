// src/delivery/request.rs
//! Wire format for the collection endpoint
//!
//! Requests are rebuilt from the queued record on every attempt; only the
//! record itself is ever persisted.

use crate::recording::event::EventRecord;
use crate::utils::config::ServerConfig;
use crate::utils::errors::{Result, TelemetryError};

/// Path of the event ingestion route
pub const EVENTS_PATH: &str = "/analytics/events/add/";

/// A ready-to-send POST request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl PendingRequest {
    /// Look up a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Target URL and credentials for event requests
#[derive(Clone)]
pub struct Endpoint {
    url: String,
    auth_token: String,
}

impl Endpoint {
    pub fn new(server_url: &str, auth_token: impl Into<String>) -> Self {
        Self {
            url: format!("{}{}", server_url.trim_end_matches('/'), EVENTS_PATH),
            auth_token: auth_token.into(),
        }
    }

    pub fn from_config(server: &ServerConfig) -> Self {
        Self::new(&server.url, server.auth_token.clone())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Serialize `record` into a request
    pub fn build(&self, record: &EventRecord) -> Result<PendingRequest> {
        let body = serde_json::to_vec(record).map_err(|e| {
            TelemetryError::SerializationFailed(format!("Failed to encode event '{}': {}", record.name, e))
        })?;

        Ok(PendingRequest {
            url: self.url.clone(),
            headers: vec![
                ("Authorization".to_string(), format!("Token {}", self.auth_token)),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body,
        })
    }
}

// Keeps the token out of logs
impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}
