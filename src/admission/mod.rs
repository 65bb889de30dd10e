// src/admission/mod.rs
//! Admission control
//!
//! Every event passes two checks before it may enter the queue:
//!
//! - **Consent Gate**: collection needs an auth token and, when configured,
//!   the player's explicit opt-in
//! - **Rate Limiter**: a hard per-minute ceiling against runaway event loops
//!
//! Rejections are silent drops; nothing here ever fails the caller.

pub mod consent;
pub mod rate_limiter;

pub use consent::{ConsentGate, ConsentState, ConsentStore, FileConsentStore, MemoryConsentStore};
pub use rate_limiter::RateLimiter;
