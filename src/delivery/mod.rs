// src/delivery/mod.rs
//! Event delivery
//!
//! - **Request**: wire format for the collection endpoint
//! - **Transport**: non-blocking "send one request" collaborator (hyper by default)
//! - **Retry**: exponential backoff between attempts
//! - **Scheduler**: ordered, single-in-flight delivery state machine
//! - **Heartbeat**: periodic quit event while the game runs
//!
//! # Flow
//!
//! ```text
//! EventQueue.front ─→ Endpoint::build ─→ Transport::send
//!                                              │
//!        ┌── 2xx: pop, cool down ──────────────┤
//!        ├── 4xx: pop (dropped), back off ─────┤
//!        └── other: keep, back off ────────────┘
//!                 (draining: persist instead)
//! ```

pub mod heartbeat;
pub mod request;
pub mod retry;
pub mod scheduler;
pub mod transport;

pub use heartbeat::QuitHeartbeat;
pub use request::{Endpoint, PendingRequest};
pub use retry::RetryState;
pub use scheduler::{DeliveryOutcome, DeliveryScheduler, DeliveryState, DeliveryStats, Followup};
pub use transport::{HttpTransport, Transport, TransportConfig, TransportError, TransportResponse};
