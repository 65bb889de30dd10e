// src/admission/consent.rs
//! Consent gate and player identity
//!
//! Consent and the player id live together in one persisted record guarded by
//! a hash of the id. A record whose hash does not match is treated as
//! tampered and replaced with a fresh identity.

use crate::utils::errors::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Persisted consent and identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentState {
    pub player_id: u64,
    pub player_id_hash: String,
    pub requested: bool,
    pub granted: bool,
}

impl ConsentState {
    /// New identity with consent neither requested nor granted
    pub fn fresh() -> Self {
        Self::for_player(rand::random::<u64>())
    }

    pub fn for_player(player_id: u64) -> Self {
        Self {
            player_id,
            player_id_hash: hash_player_id(player_id),
            requested: false,
            granted: false,
        }
    }

    /// Whether the stored hash matches the stored player id
    pub fn is_authentic(&self) -> bool {
        self.player_id_hash == hash_player_id(self.player_id)
    }
}

/// Tamper-evidence digest of a player id
pub fn hash_player_id(player_id: u64) -> String {
    blake3::hash(player_id.to_string().as_bytes()).to_hex().to_string()
}

/// Persistent home of the consent record
///
/// Implementations may block; the gate calls them from tokio's blocking pool.
pub trait ConsentStore: Send + Sync {
    /// Read the stored record, `None` on first run
    fn load(&self) -> Result<Option<ConsentState>>;

    fn save(&self, state: &ConsentState) -> Result<()>;
}

/// JSON file store
#[derive(Debug, Clone)]
pub struct FileConsentStore {
    path: PathBuf,
}

impl FileConsentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConsentStore for FileConsentStore {
    fn load(&self) -> Result<Option<ConsentState>> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TelemetryError::StorageFailed(format!(
                    "Failed to read consent file: {}",
                    e
                )))
            }
        };

        serde_json::from_slice(&data).map(Some).map_err(|e| {
            TelemetryError::SerializationFailed(format!("Failed to parse consent file: {}", e))
        })
    }

    fn save(&self, state: &ConsentState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                TelemetryError::StorageFailed(format!("Failed to create consent directory: {}", e))
            })?;
        }

        let json = serde_json::to_vec_pretty(state).map_err(|e| {
            TelemetryError::SerializationFailed(format!("Failed to encode consent: {}", e))
        })?;

        std::fs::write(&self.path, json).map_err(|e| {
            TelemetryError::StorageFailed(format!("Failed to write consent file: {}", e))
        })
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    state: Option<ConsentState>,
    saves: usize,
}

/// In-memory store; clones share the same record
///
/// Suits hosts without writable storage and lets callers observe writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryConsentStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryConsentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `state`
    pub fn with_state(state: ConsentState) -> Self {
        let store = Self::default();
        store.lock().state = Some(state);
        store
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    /// Currently stored record
    pub fn stored(&self) -> Option<ConsentState> {
        self.lock().state.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConsentStore for MemoryConsentStore {
    fn load(&self) -> Result<Option<ConsentState>> {
        Ok(self.lock().state.clone())
    }

    fn save(&self, state: &ConsentState) -> Result<()> {
        let mut inner = self.lock();
        inner.state = Some(state.clone());
        inner.saves += 1;
        Ok(())
    }
}

/// Decides whether collection may happen
pub struct ConsentGate {
    store: Arc<dyn ConsentStore>,
    state: ConsentState,
    consent_required: bool,
    has_credentials: bool,
}

impl ConsentGate {
    /// Load (or create) the consent record
    ///
    /// Unreadable and tampered records are replaced by a fresh identity.
    pub async fn initialize(store: Arc<dyn ConsentStore>, consent_required: bool, has_credentials: bool) -> Self {
        let loaded = match on_blocking_pool(&store, |store| store.load()).await {
            Ok(Some(state)) if state.is_authentic() => {
                debug!("Loaded consent record for player {}", state.player_id);
                Some(state)
            }
            Ok(Some(state)) => {
                warn!(
                    "Consent record for player {} failed its integrity check, reinitializing",
                    state.player_id
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Could not load consent record, reinitializing: {}", e);
                None
            }
        };

        let mut gate = Self {
            store,
            state: loaded.clone().unwrap_or_else(ConsentState::fresh),
            consent_required,
            has_credentials,
        };

        if loaded.is_none() {
            info!("Initialized player identity {}", gate.state.player_id);
            gate.persist().await;
        }

        gate
    }

    /// Credentials present and consent not needed or given
    pub fn is_collection_enabled(&self) -> bool {
        self.has_credentials && (!self.consent_required || self.state.granted)
    }

    /// Whether the host should show its consent dialog
    pub fn should_prompt_user(&self) -> bool {
        self.consent_required && !self.state.requested && !self.state.granted
    }

    /// Record that the player opted in
    pub async fn approve(&mut self) {
        self.state.requested = true;
        self.state.granted = true;
        info!("Data collection approved");
        self.persist().await;
    }

    /// Record that the player opted out; repeated denials write nothing
    pub async fn deny(&mut self) {
        if self.state.requested && !self.state.granted {
            debug!("Data collection already denied");
            return;
        }
        self.state.requested = true;
        self.state.granted = false;
        info!("Data collection denied");
        self.persist().await;
    }

    pub fn player_id(&self) -> u64 {
        self.state.player_id
    }

    pub fn state(&self) -> &ConsentState {
        &self.state
    }

    async fn persist(&self) {
        let state = self.state.clone();
        if let Err(e) = on_blocking_pool(&self.store, move |store| store.save(&state)).await {
            error!("Failed to persist consent record: {}", e);
        }
    }
}

impl std::fmt::Debug for ConsentGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentGate")
            .field("state", &self.state)
            .field("consent_required", &self.consent_required)
            .field("has_credentials", &self.has_credentials)
            .finish()
    }
}

/// Run a store call without blocking the service task
async fn on_blocking_pool<T, F>(store: &Arc<dyn ConsentStore>, call: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn ConsentStore) -> Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .map_err(|e| TelemetryError::StorageFailed(format!("Consent store task failed: {}", e)))?
}
