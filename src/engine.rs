//! Game engine: the driving controller for one player context
//!
//! Owns the wallet and the player's sessions behind a single mutex, so
//! concurrent `reveal`/`cash_out` calls on the same session are serialized and
//! only the first one observing `Active` performs the transition. Only the
//! active session and the most recently finished one are kept in memory;
//! older sessions live on as [`SessionSummary`] entries in the history. The
//! event log is shared with the sync worker and only ever locked briefly.

use crate::common::config::validate;
use crate::common::traits::{KeyValueStore, RandomSource};
use crate::common::types::{Money, Multiplier, SessionId};
use crate::config::GameConfig;
use crate::errors::{GameError, GameResult, GridstakeResult};
use crate::event_log::EventLog;
use crate::game_store::PlayerStore;
use crate::games::board::Board;
use crate::games::random::StdRandom;
use crate::games::session::{GameSession, PlayerContext, SessionRules};
use crate::games::types::{CashOutReceipt, RevealOutcome, SessionSnapshot};
use crate::stats::{HouseReport, SessionSummary};
use crate::wallet::WalletLedger;
use std::sync::{Arc, Mutex, MutexGuard};

struct EngineState {
    wallet: WalletLedger,
    active: Option<GameSession>,
    /// Kept so the board of a just-ended game can still be shown
    last_finished: Option<GameSession>,
    history: Vec<SessionSummary>,
}

/// Locate a session still held in memory; older finished ones are only known from the history
fn find_session<'a>(
    active: &'a mut Option<GameSession>,
    last_finished: &'a mut Option<GameSession>,
    history: &[SessionSummary],
    session_id: SessionId,
) -> GameResult<&'a mut GameSession> {
    if let Some(session) = active.as_mut().filter(|s| s.id() == session_id) {
        return Ok(session);
    }
    if let Some(session) = last_finished.as_mut().filter(|s| s.id() == session_id) {
        return Ok(session);
    }
    if history.iter().rev().any(|summary| summary.session_id == session_id) {
        return Err(GameError::SessionAlreadyEnded(session_id));
    }
    Err(GameError::SessionNotFound(session_id))
}

pub struct GameEngine {
    config: GameConfig,
    player: PlayerContext,
    rules: SessionRules,
    state: Mutex<EngineState>,
    events: Arc<EventLog>,
    store: Option<PlayerStore>,
    random: Mutex<Box<dyn RandomSource>>,
}

impl GameEngine {
    /// In-memory engine; nothing survives the process
    pub fn new(config: GameConfig) -> GridstakeResult<Self> {
        validate(&config)?;
        let wallet = WalletLedger::new(config.wallet.starting_balance);
        Self::assemble(config, wallet, Vec::new(), EventLog::new(), None)
    }

    /// Engine backed by a key-value store: wallet, history and undelivered
    /// events are loaded now and written after every mutation
    pub fn with_store(config: GameConfig, store: Arc<dyn KeyValueStore>) -> GridstakeResult<Self> {
        validate(&config)?;
        let player_store = PlayerStore::new(store, config.player.player_id.clone());

        let wallet = match player_store.load_wallet()? {
            Some(wallet) => {
                tracing::info!(player = %config.player.player_id, balance = %wallet.balance(), "Restored wallet");
                wallet
            }
            None => WalletLedger::new(config.wallet.starting_balance),
        };
        let pending = player_store.load_pending()?;
        if !pending.is_empty() {
            tracing::info!(sessions = pending.len(), "Restored undelivered session events");
        }
        let next_seq = player_store.load_next_seq()?.unwrap_or(0);
        let history = player_store.load_history()?;

        let events = EventLog::restore(pending, next_seq);
        let engine = Self::assemble(config, wallet, history, events, Some(player_store))?;
        {
            let state = engine.lock();
            engine.persist(&state.wallet);
        }
        Ok(engine)
    }

    fn assemble(
        config: GameConfig,
        wallet: WalletLedger,
        history: Vec<SessionSummary>,
        events: EventLog,
        store: Option<PlayerStore>,
    ) -> GridstakeResult<Self> {
        let player = PlayerContext {
            player_id: config.player.player_id.clone(),
            username: config.player.username.clone(),
        };
        let rules = config.session_rules()?;

        Ok(Self {
            config,
            player,
            rules,
            state: Mutex::new(EngineState {
                wallet,
                active: None,
                last_finished: None,
                history,
            }),
            events: Arc::new(events),
            store,
            random: Mutex::new(Box::new(StdRandom::from_entropy())),
        })
    }

    /// Replace the random source used for bomb placement
    pub fn with_random<R: RandomSource + 'static>(self, random: R) -> Self {
        Self {
            random: Mutex::new(Box::new(random)),
            ..self
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a session with the configured default grid size and bomb rate
    pub fn start_default(&self, stake: Money) -> GameResult<SessionSnapshot> {
        self.start_session(stake, self.config.grid.default_size, self.config.bombs.default_probability)
    }

    pub fn start_session(&self, stake: Money, grid_size: usize, bomb_probability: f64) -> GameResult<SessionSnapshot> {
        let grid = &self.config.grid;
        if grid_size < grid.min_size || grid_size > grid.max_size {
            return Err(GameError::InvalidConfiguration(format!(
                "grid size {} not allowed (expected {}..={})",
                grid_size, grid.min_size, grid.max_size
            )));
        }
        if !self.config.bombs.allows(bomb_probability) {
            return Err(GameError::InvalidConfiguration(format!(
                "bomb probability {} not allowed (allowed: {:?})",
                bomb_probability, self.config.bombs.allowed_probabilities
            )));
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(active) = &state.active {
            return Err(GameError::SessionInProgress(active.id()));
        }

        let board = {
            let mut random = self.random.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Board::generate(grid_size, bomb_probability, &mut **random)?
        };

        let session = GameSession::start(
            SessionId::new(),
            &self.player,
            stake,
            board,
            self.rules,
            &mut state.wallet,
            &self.events,
        )?;

        let snapshot = session.snapshot();
        state.active = Some(session);
        self.persist(&state.wallet);

        Ok(snapshot)
    }

    pub fn reveal(&self, session_id: SessionId, row: usize, col: usize) -> GameResult<RevealOutcome> {
        let mut guard = self.lock();
        let EngineState {
            wallet,
            active,
            last_finished,
            history,
        } = &mut *guard;

        let session = find_session(active, last_finished, history, session_id)?;
        let outcome = session.reveal(row, col, wallet, &self.events)?;
        if outcome.ends_session() {
            self.finish(&mut guard);
        }
        self.persist(&guard.wallet);

        Ok(outcome)
    }

    pub fn cash_out(&self, session_id: SessionId) -> GameResult<CashOutReceipt> {
        let mut guard = self.lock();
        let EngineState {
            wallet,
            active,
            last_finished,
            history,
        } = &mut *guard;

        let session = find_session(active, last_finished, history, session_id)?;
        let receipt = session.cash_out(wallet, &self.events)?;
        self.finish(&mut guard);
        self.persist(&guard.wallet);

        Ok(receipt)
    }

    /// Move the just-ended active session into the history, replacing the
    /// previously finished one
    fn finish(&self, state: &mut EngineState) {
        let Some(session) = state.active.take() else {
            return;
        };
        if let Some(summary) = session.summary() {
            state.history.push(summary);
            if let Some(store) = &self.store {
                if let Err(e) = store.save_history(&state.history) {
                    tracing::warn!(session = %session.id(), "Failed to persist session history: {}", e);
                }
            }
        }
        state.last_finished = Some(session);
    }

    /// Write wallet and event queue; failures are logged and never fail gameplay
    fn persist(&self, wallet: &WalletLedger) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = self
            .events
            .persist_with(|streams, next_seq| store.save_all(wallet, streams, next_seq))
        {
            tracing::warn!(player = %self.player.player_id, "Failed to persist player state: {}", e);
        }
    }

    /// Snapshot of the active or the most recently finished session
    pub fn snapshot(&self, session_id: SessionId) -> GameResult<SessionSnapshot> {
        let state = self.lock();
        state
            .active
            .iter()
            .chain(state.last_finished.iter())
            .find(|session| session.id() == session_id)
            .map(GameSession::snapshot)
            .ok_or(GameError::SessionNotFound(session_id))
    }

    pub fn active_session(&self) -> Option<SessionSnapshot> {
        self.lock().active.as_ref().map(GameSession::snapshot)
    }

    pub fn balance(&self) -> Money {
        self.lock().wallet.balance()
    }

    pub fn wallet(&self) -> WalletLedger {
        self.lock().wallet.clone()
    }

    pub fn history(&self) -> Vec<SessionSummary> {
        self.lock().history.clone()
    }

    pub fn house_report(&self, commission_rate: Multiplier) -> HouseReport {
        HouseReport::from_summaries(&self.lock().history, commission_rate)
    }

    /// Event log shared with the sync worker
    pub fn events(&self) -> Arc<EventLog> {
        self.events.clone()
    }

    pub fn player_store(&self) -> Option<PlayerStore> {
        self.store.clone()
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }
}
