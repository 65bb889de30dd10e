// src/recording/mod.rs
//! Pending event storage
//!
//! - **Event**: the immutable record sent to the collection server
//! - **Event Queue**: in-memory FIFO of records awaiting delivery
//! - **Compressor**: zstd codec for the snapshot file
//! - **Storage**: one-shot crash-recovery snapshot of the queue
//!
//! # Lifecycle
//!
//! ```text
//! add_event → EventQueue ──(delivered)──→ dropped
//!                 │
//!          (exit with failures)
//!                 ↓
//!        SnapshotStore::save ──(next start)──→ take → EventQueue
//! ```

pub mod compressor;
pub mod event;
pub mod event_queue;
pub mod storage;

// Re-export commonly used types
pub use compressor::Compressor;
pub use event::{EventRecord, Properties, SessionContext};
pub use event_queue::{EventQueue, QueueStats};
pub use storage::SnapshotStore;
