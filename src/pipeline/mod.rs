// src/pipeline/mod.rs
//! Telemetry facade
//!
//! [`Telemetry`] is the only type a host needs: it starts the background
//! [`TelemetryService`], forwards events and consent decisions to it, and
//! reports when the queue has drained on exit.
//!
//! ```text
//! host ──add_event──→ Telemetry ──Command──→ TelemetryService
//!                                              ├─ ConsentGate
//!                                              ├─ RateLimiter
//!                                              ├─ DeliveryScheduler ──→ Transport
//!                                              ├─ QuitHeartbeat
//!                                              └─ SnapshotStore
//! ```

pub mod handle;
pub mod service;

pub use handle::{ExitSignal, Telemetry};
pub use service::{PipelineStats, TelemetryService};
