// src/lib.rs
//! Game Telemetry Library
//!
//! Client-side event pipeline for games: admits named events, queues them in
//! memory and delivers them one request at a time to a collection server,
//! without stalling the host's frame loop.
//!
//! # Architecture
//!
//! - **admission**: consent gate and per-minute rate ceiling
//! - **recording**: event records, the pending queue and its disk snapshot
//! - **delivery**: wire format, transport, backoff and the delivery state machine
//! - **pipeline**: the background service and the host-facing handle
//! - **observability**: tracing setup and metric names
//! - **utils**: configuration and errors
//!
//! # Example
//!
//! ```no_run
//! use game_telemetry::{FileConsentStore, HttpTransport, Telemetry, TelemetryConfig, TransportConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> game_telemetry::Result<()> {
//! let config = TelemetryConfig::load()?;
//! let transport = HttpTransport::new(TransportConfig::from(&config.server));
//! let consent = FileConsentStore::new(&config.consent.config_file_path);
//!
//! let telemetry = Telemetry::start(config, Arc::new(transport), Box::new(consent))?;
//! telemetry.add_event("level_complete", None);
//!
//! telemetry.handle_exit();
//! telemetry.wait_for_exit().await?;
//! # Ok(())
//! # }
//! ```

// Public module exports
pub mod admission;
pub mod delivery;
pub mod observability;
pub mod pipeline;
pub mod recording;
pub mod utils;

// Re-export commonly used types
pub use admission::consent::{ConsentStore, FileConsentStore, MemoryConsentStore};
pub use delivery::transport::{HttpTransport, Transport, TransportConfig, TransportError, TransportResponse};
pub use pipeline::{ExitSignal, PipelineStats, Telemetry};
pub use recording::event::{EventRecord, Properties};
pub use utils::config::TelemetryConfig;
pub use utils::errors::{Result, TelemetryError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Library build information
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}
