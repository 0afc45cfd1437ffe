//! Gridstake - grid betting game session engine
//!
//! A player stakes currency, reveals cells on a square grid and either cashes
//! out at the current multiplier or hits a bomb and forfeits the stake.
//! Every state transition is recorded in an append-only event log that is
//! delivered to a remote analytics sink in the background, and queues locally
//! while the sink is unreachable.
//!
//! ```no_run
//! use gridstake::{GameConfig, GameEngine, Money};
//!
//! let engine = GameEngine::new(GameConfig::default())?;
//! let session = engine.start_default(Money::from_units(100))?;
//! engine.reveal(session.session_id, 0, 0)?;
//! # Ok::<(), gridstake::GridstakeError>(())
//! ```

pub mod common;
pub mod config;
pub mod engine;
pub mod errors;
pub mod event_log;
pub mod game_store;
pub mod games;
pub mod sink;
pub mod stats;
pub mod storage;
pub mod sync;
pub mod wallet;

pub use common::config::{generate_sample_config, ConfigLoader};
pub use common::traits::{KeyValueStore, RandomSource, RemoteSink};
pub use common::types::{CellPosition, Money, Multiplier, SessionId};
pub use config::GameConfig;
pub use engine::GameEngine;
pub use errors::{GameError, GameResult, GridstakeError, GridstakeResult, SinkError, StorageError};
pub use event_log::{EventLog, FlushReport};
pub use games::{RevealOutcome, SessionSnapshot, SessionStatus};
pub use sink::{HttpSink, MemorySink};
pub use stats::{HouseReport, SessionSummary};
pub use storage::{MemoryStore, RocksStore};
pub use sync::{SyncHandle, SyncWorker};
pub use wallet::WalletLedger;
