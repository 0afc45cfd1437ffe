//! Persistent player state: wallet ledger and undelivered event streams.

use crate::common::traits::KeyValueStore;
use crate::errors::StorageError;
use crate::event_log::SessionStream;
use crate::stats::SessionSummary;
use crate::wallet::WalletLedger;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

const WALLET_PREFIX: &str = "wallet:";
const PENDING_EVENTS_PREFIX: &str = "events:pending:";
const EVENT_SEQ_PREFIX: &str = "events:seq:";
const HISTORY_PREFIX: &str = "history:";

fn wallet_key(player_id: &str) -> Vec<u8> {
    format!("{}{}", WALLET_PREFIX, player_id).into_bytes()
}

fn pending_events_key(player_id: &str) -> Vec<u8> {
    format!("{}{}", PENDING_EVENTS_PREFIX, player_id).into_bytes()
}

fn event_seq_key(player_id: &str) -> Vec<u8> {
    format!("{}{}", EVENT_SEQ_PREFIX, player_id).into_bytes()
}

fn history_key(player_id: &str) -> Vec<u8> {
    format!("{}{}", HISTORY_PREFIX, player_id).into_bytes()
}

/// Wallet and event queue of one player context
#[derive(Clone)]
pub struct PlayerStore {
    store: Arc<dyn KeyValueStore>,
    player_id: String,
}

impl PlayerStore {
    pub fn new(store: Arc<dyn KeyValueStore>, player_id: impl Into<String>) -> Self {
        Self {
            store,
            player_id: player_id.into(),
        }
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn load_wallet(&self) -> Result<Option<WalletLedger>, StorageError> {
        self.load(&wallet_key(&self.player_id), "wallet")
    }

    pub fn save_wallet(&self, wallet: &WalletLedger) -> Result<(), StorageError> {
        let bytes = encode(wallet, "wallet")?;
        self.store.put(&wallet_key(&self.player_id), &bytes)
    }

    pub fn load_pending(&self) -> Result<Vec<SessionStream>, StorageError> {
        Ok(self
            .load(&pending_events_key(&self.player_id), "pending events")?
            .unwrap_or_default())
    }

    /// Sequence number for the next event, if one was ever stored
    pub fn load_next_seq(&self) -> Result<Option<u64>, StorageError> {
        self.load(&event_seq_key(&self.player_id), "event sequence")
    }

    /// Replace the stored queue and sequence counter; an empty queue removes its key
    pub fn save_pending(&self, streams: &[SessionStream], next_seq: u64) -> Result<(), StorageError> {
        let mut items = vec![(event_seq_key(&self.player_id), encode(&next_seq, "event sequence")?)];
        self.write_queue(&mut items, streams)
    }

    /// Write wallet, queue and sequence counter together
    pub fn save_all(&self, wallet: &WalletLedger, streams: &[SessionStream], next_seq: u64) -> Result<(), StorageError> {
        let mut items = vec![
            (wallet_key(&self.player_id), encode(wallet, "wallet")?),
            (event_seq_key(&self.player_id), encode(&next_seq, "event sequence")?),
        ];
        self.write_queue(&mut items, streams)
    }

    fn write_queue(&self, items: &mut Vec<(Vec<u8>, Vec<u8>)>, streams: &[SessionStream]) -> Result<(), StorageError> {
        let key = pending_events_key(&self.player_id);
        if streams.is_empty() {
            self.store.batch_write(items.as_slice())?;
            return self.store.delete(&key);
        }
        items.push((key, encode(&streams, "pending events")?));
        self.store.batch_write(items.as_slice())
    }

    /// Summaries of finished sessions, oldest first
    pub fn load_history(&self) -> Result<Vec<SessionSummary>, StorageError> {
        Ok(self
            .load(&history_key(&self.player_id), "session history")?
            .unwrap_or_default())
    }

    pub fn save_history(&self, history: &[SessionSummary]) -> Result<(), StorageError> {
        let bytes = encode(history, "session history")?;
        self.store.put(&history_key(&self.player_id), &bytes)
    }

    fn load<T: DeserializeOwned>(&self, key: &[u8], what: &str) -> Result<Option<T>, StorageError> {
        let Some(bytes) = self.store.get(key)? else {
            return Ok(None);
        };

        let value = serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::CorruptedData(format!(
                "Failed to decode {} for player {}: {}",
                what, self.player_id, e
            ))
        })?;
        Ok(Some(value))
    }
}

fn encode<T: Serialize + ?Sized>(value: &T, what: &str) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value)
        .map_err(|e| StorageError::WriteFailed(format!("Failed to encode {}: {}", what, e)))
}
