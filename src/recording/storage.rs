// src/recording/storage.rs
//! Single-shot crash-recovery snapshot of the pending queue
//!
//! The snapshot is not a durable log. It is written when the queue cannot be
//! delivered before exit, read once on the next start and deleted right after.

use crate::recording::compressor::Compressor;
use crate::recording::event::EventRecord;
use crate::recording::event_queue::EventQueue;
use crate::utils::config::{LimitsConfig, PersistenceConfig};
use crate::utils::errors::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk envelope
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    saved_at: i64,
    events: Vec<EventRecord>,
}

/// Reads and writes the queue snapshot file
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
    max_records: usize,
    compressor: Compressor,
}

impl SnapshotStore {
    /// Create a store for `path` keeping at most `max_records` records
    pub fn new(path: impl Into<PathBuf>, max_records: usize, compressor: Compressor) -> Self {
        Self {
            path: path.into(),
            max_records,
            compressor,
        }
    }

    pub fn from_config(persistence: &PersistenceConfig, limits: &LimitsConfig) -> Self {
        Self::new(
            &persistence.snapshot_path,
            limits.max_persisted_events,
            Compressor::new(persistence.compression_level),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `queue`, truncating it in place to the most recent records
    ///
    /// Returns the number of records written.
    pub async fn save(&self, queue: &mut EventQueue) -> Result<usize> {
        let dropped = queue.truncate_to_most_recent(self.max_records);
        if dropped > 0 {
            warn!(
                "Snapshot limit is {} events, dropping {} oldest",
                self.max_records, dropped
            );
        }

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: chrono::Utc::now().timestamp(),
            events: queue.iter().cloned().collect(),
        };
        let count = snapshot.events.len();

        let json = serde_json::to_vec(&snapshot).map_err(|e| {
            TelemetryError::SerializationFailed(format!("Failed to encode snapshot: {}", e))
        })?;
        let compressed = self.compressor.compress(&json)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                TelemetryError::StorageFailed(format!("Failed to create snapshot directory: {}", e))
            })?;
        }

        // Written beside the target, then renamed into place
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &compressed).await.map_err(|e| {
            TelemetryError::StorageFailed(format!("Failed to write snapshot: {}", e))
        })?;
        fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            TelemetryError::StorageFailed(format!("Failed to move snapshot into place: {}", e))
        })?;

        info!("Saved {} pending events to {:?}", count, self.path);
        Ok(count)
    }

    /// Read the snapshot if one exists
    pub async fn load(&self) -> Result<Option<Vec<EventRecord>>> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TelemetryError::StorageFailed(format!(
                    "Failed to read snapshot: {}",
                    e
                )))
            }
        };

        let json = self.compressor.decompress(&data)?;
        let snapshot: Snapshot = serde_json::from_slice(&json).map_err(|e| {
            TelemetryError::SerializationFailed(format!("Failed to decode snapshot: {}", e))
        })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(TelemetryError::SerializationFailed(format!(
                "Unsupported snapshot version {}",
                snapshot.version
            )));
        }

        debug!(
            "Read snapshot with {} events saved at {}",
            snapshot.events.len(),
            snapshot.saved_at
        );
        Ok(Some(snapshot.events))
    }

    /// Delete the snapshot file; a missing file is not an error
    pub async fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TelemetryError::StorageFailed(format!(
                "Failed to remove snapshot: {}",
                e
            ))),
        }
    }

    /// Load and delete in one step
    ///
    /// The file is removed even when it cannot be decoded, so a corrupt
    /// snapshot is reported once and never again.
    pub async fn take(&self) -> Result<Option<Vec<EventRecord>>> {
        let loaded = self.load().await;
        if !matches!(loaded, Ok(None)) {
            if let Err(e) = self.remove().await {
                warn!("Snapshot {:?} was read but not removed: {}", self.path, e);
            }
        }
        loaded
    }

    /// Add `pending` after whatever the snapshot already holds
    ///
    /// The combined queue is capped like `save`. An unreadable existing
    /// snapshot is replaced. Returns the number of records written.
    pub async fn append(&self, pending: EventQueue) -> Result<usize> {
        let mut merged = EventQueue::new();
        match self.load().await {
            Ok(Some(existing)) => {
                debug!("Appending {} events to {} already saved", pending.len(), existing.len());
                merged.extend(existing);
            }
            Ok(None) => {}
            Err(e) => warn!("Replacing unreadable snapshot {:?}: {}", self.path, e),
        }
        merged.extend(pending.iter().cloned());

        self.save(&mut merged).await
    }
}
