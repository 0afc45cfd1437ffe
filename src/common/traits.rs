//! Shared traits and interfaces
//!
//! The engine's collaborators are reached through these seams so that tests can
//! inject determinism (random source), failure (remote sink) and persistence
//! (key-value store).

use crate::errors::{SinkError, StorageError};
use crate::games::types::{GameEvent, RemoteSessionToken, SessionRegistration};
use async_trait::async_trait;

/// Uniform random generator used for bomb placement
pub trait RandomSource: Send {
    /// Next sample in `[0, 1)`
    fn next_unit(&mut self) -> f64;
}

/// Best-effort telemetry backend that receives session lifecycle events
#[async_trait]
pub trait RemoteSink: Send + Sync {
    /// Register a session and return the backend's token for it
    async fn start_session(
        &self,
        registration: &SessionRegistration,
    ) -> Result<RemoteSessionToken, SinkError>;

    /// Record one event against a registered session
    async fn log_event(&self, token: &RemoteSessionToken, event: &GameEvent) -> Result<(), SinkError>;
}

/// Local key-value store used for wallet balance and queued events.
///
/// The engine loads from it on startup and writes after every mutation; the
/// storage format belongs to the implementation.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    /// Write several entries at once
    fn batch_write(&self, items: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StorageError> {
        for (key, value) in items {
            self.put(key, value)?;
        }
        Ok(())
    }
}
