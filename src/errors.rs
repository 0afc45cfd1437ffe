//! Error types for the Gridstake game engine
//!
//! Every gameplay failure is a local, recoverable condition reported to the
//! caller. Remote sink failures are kept apart from game errors: they only
//! switch the event log into offline mode and are never returned from a
//! gameplay operation.

use crate::common::types::{CellPosition, Money, SessionId};

/// Root error type for all Gridstake operations
#[derive(Debug, thiserror::Error)]
pub enum GridstakeError {
    /// Gameplay rule violations
    #[error("Game error: {0}")]
    Game(#[from] GameError),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Local persistence errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Remote sink delivery errors
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Gameplay errors reported by the board, the session state machine and the wallet
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid stake {stake}: must be between {min} and {max}")]
    InvalidStake { stake: Money, min: Money, max: Money },

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Money, available: Money },

    #[error("Cell {row}-{col} is outside the {size}x{size} grid")]
    OutOfBounds { row: usize, col: usize, size: usize },

    #[error("Cell {0} was already revealed")]
    CellAlreadyRevealed(CellPosition),

    #[error("Cash out not allowed: {safe_reveals} safe reveals, {required} required")]
    CashOutNotAllowed { safe_reveals: u32, required: u32 },

    #[error("Session {0} has already ended")]
    SessionAlreadyEnded(SessionId),

    #[error("Session {0} is still active")]
    SessionInProgress(SessionId),

    #[error("Session {0} not found")]
    SessionNotFound(SessionId),
}

/// Configuration and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Local persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

/// Remote sink errors
///
/// Transient errors toggle offline mode and are retried by the sync worker;
/// permanent ones (see [`SinkError::is_permanent`]) are never retried.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    #[error("Sink unreachable: {0}")]
    Unavailable(String),

    #[error("Sink call timed out after {0}ms")]
    Timeout(u64),

    #[error("Sink rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed sink response: {0}")]
    InvalidResponse(String),

    #[error("Session not registered with the sink: {0}")]
    NotRegistered(String),
}

impl SinkError {
    /// Resending the same request cannot succeed: a 4xx other than
    /// 408 Request Timeout and 429 Too Many Requests, or a stream the sink never accepted
    pub fn is_permanent(&self) -> bool {
        match self {
            SinkError::Rejected { status, .. } => (400..500).contains(status) && *status != 408 && *status != 429,
            SinkError::NotRegistered(_) => true,
            SinkError::Unavailable(_) | SinkError::Timeout(_) | SinkError::InvalidResponse(_) => false,
        }
    }
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::WriteFailed(e.to_string())
    }
}

impl From<rocksdb::Error> for GridstakeError {
    fn from(e: rocksdb::Error) -> Self {
        GridstakeError::Storage(e.into())
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return SinkError::InvalidResponse(e.to_string());
        }
        SinkError::Unavailable(e.to_string())
    }
}

/// Convenience alias for gameplay results
pub type GameResult<T> = Result<T, GameError>;

/// Convenience alias for everything else
pub type GridstakeResult<T> = Result<T, GridstakeError>;
