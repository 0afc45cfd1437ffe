//! Game session state machine
//!
//! `Active -> CashedOut` and `Active -> BombHit` are the only transitions, and
//! both are terminal. Every transition appends to the event log and touches
//! the wallet at most once.

use crate::common::types::{CellPosition, Money, Multiplier, SessionId};
use crate::errors::{GameError, GameResult};
use crate::event_log::EventLog;
use crate::games::board::Board;
use crate::games::multiplier::MultiplierPolicy;
use crate::games::types::{
    CashOutReceipt, EventKind, EventPayload, RevealOutcome, SessionRegistration, SessionSnapshot,
    SessionStatus,
};
use crate::stats::SessionSummary;
use crate::wallet::WalletLedger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-session copy of the deployment rules in force when it started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRules {
    pub policy: MultiplierPolicy,
    pub min_reveals_to_cash_out: u32,
    pub min_stake: Money,
    pub max_stake: Money,
}

impl Default for SessionRules {
    fn default() -> Self {
        Self {
            policy: MultiplierPolicy::default(),
            min_reveals_to_cash_out: 5,
            min_stake: Money::from_units(1),
            max_stake: Money::from_units(1_000),
        }
    }
}

/// Player identity recorded with the session's registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerContext {
    pub player_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    id: SessionId,
    player_id: String,
    stake: Money,
    multiplier: Multiplier,
    safe_reveals: u32,
    status: SessionStatus,
    board: Board,
    rules: SessionRules,
    created_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    payout: Option<Money>,
    perfect: bool,
}

impl GameSession {
    /// Validate the stake, debit it and emit `GAME_STARTED`.
    ///
    /// Stake bounds and funds are checked before the wallet is touched, so a
    /// failed start leaves no trace.
    pub fn start(
        id: SessionId,
        player: &PlayerContext,
        stake: Money,
        board: Board,
        rules: SessionRules,
        wallet: &mut WalletLedger,
        events: &EventLog,
    ) -> GameResult<Self> {
        if stake < rules.min_stake || stake > rules.max_stake {
            return Err(GameError::InvalidStake {
                stake,
                min: rules.min_stake,
                max: rules.max_stake,
            });
        }
        if stake > wallet.balance() {
            return Err(GameError::InsufficientFunds {
                requested: stake,
                available: wallet.balance(),
            });
        }

        let starting_balance = wallet.balance();
        let balance = wallet.debit(stake)?;
        let multiplier = rules.policy.multiplier_after(0);

        let session = Self {
            id,
            player_id: player.player_id.clone(),
            stake,
            multiplier,
            safe_reveals: 0,
            status: SessionStatus::Active,
            board,
            rules,
            created_at: Utc::now(),
            ended_at: None,
            payout: None,
            perfect: false,
        };

        events.open_session(
            SessionRegistration {
                session_id: id,
                player_id: player.player_id.clone(),
                username: player.username.clone(),
                starting_balance,
                grid_size: session.board.size(),
                bomb_probability: session.board.bomb_probability(),
                stake,
            },
            EventPayload {
                amount: Some(stake),
                balance: Some(balance),
                multiplier: Some(multiplier),
                ..EventPayload::default()
            },
        );

        tracing::info!(
            session = %id,
            stake = %stake,
            grid = session.board.size(),
            bomb_probability = session.board.bomb_probability(),
            "Session started"
        );
        Ok(session)
    }

    pub fn reveal(
        &mut self,
        row: usize,
        col: usize,
        wallet: &mut WalletLedger,
        events: &EventLog,
    ) -> GameResult<RevealOutcome> {
        self.ensure_active()?;

        let position = CellPosition::new(row, col);
        let is_bomb = self.board.reveal(row, col)?;

        if is_bomb {
            self.status = SessionStatus::BombHit;
            self.ended_at = Some(Utc::now());
            let balance = wallet.balance();

            events.append(
                self.id,
                EventKind::BombHit,
                EventPayload {
                    position: Some(position),
                    balance: Some(balance),
                    multiplier: Some(self.multiplier),
                    ..EventPayload::default()
                },
            );
            tracing::info!(session = %self.id, cell = %position, stake = %self.stake, "Bomb hit");
            return Ok(RevealOutcome::Bomb { position, balance });
        }

        self.safe_reveals += 1;
        self.multiplier = self.rules.policy.multiplier_after(self.safe_reveals);
        events.append(
            self.id,
            EventKind::Flip,
            EventPayload {
                position: Some(position),
                balance: Some(wallet.balance()),
                multiplier: Some(self.multiplier),
                ..EventPayload::default()
            },
        );
        tracing::debug!(
            session = %self.id,
            cell = %position,
            safe_reveals = self.safe_reveals,
            multiplier = %self.multiplier,
            "Safe cell revealed"
        );

        if self.safe_reveals as usize == self.board.safe_cell_count() {
            let (payout, balance) = self.settle(wallet, events, true);
            return Ok(RevealOutcome::Perfect {
                position,
                multiplier: self.multiplier,
                payout,
                balance,
            });
        }

        Ok(RevealOutcome::Safe {
            position,
            multiplier: self.multiplier,
            safe_reveals: self.safe_reveals,
        })
    }

    pub fn cash_out(&mut self, wallet: &mut WalletLedger, events: &EventLog) -> GameResult<CashOutReceipt> {
        self.ensure_active()?;

        let required = self.rules.min_reveals_to_cash_out;
        if self.safe_reveals < required {
            return Err(GameError::CashOutNotAllowed {
                safe_reveals: self.safe_reveals,
                required,
            });
        }

        let (payout, balance) = self.settle(wallet, events, false);
        Ok(CashOutReceipt {
            session_id: self.id,
            stake: self.stake,
            multiplier: self.multiplier,
            payout,
            balance,
        })
    }

    /// Credit the payout and close the session as cashed out
    fn settle(&mut self, wallet: &mut WalletLedger, events: &EventLog, perfect: bool) -> (Money, Money) {
        let payout = self.stake.apply_multiplier(self.multiplier);
        let balance = wallet.credit(payout);

        self.status = SessionStatus::CashedOut;
        self.ended_at = Some(Utc::now());
        self.payout = Some(payout);
        self.perfect = perfect;

        events.append(
            self.id,
            EventKind::CashOut,
            EventPayload {
                amount: Some(payout),
                balance: Some(balance),
                multiplier: Some(self.multiplier),
                perfect,
                ..EventPayload::default()
            },
        );
        tracing::info!(
            session = %self.id,
            payout = %payout,
            multiplier = %self.multiplier,
            perfect,
            "Session cashed out"
        );
        (payout, balance)
    }

    fn ensure_active(&self) -> GameResult<()> {
        if self.status.is_terminal() {
            return Err(GameError::SessionAlreadyEnded(self.id));
        }
        Ok(())
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn stake(&self) -> Money {
        self.stake
    }

    pub fn multiplier(&self) -> Multiplier {
        self.multiplier
    }

    pub fn safe_reveals(&self) -> u32 {
        self.safe_reveals
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn rules(&self) -> &SessionRules {
        &self.rules
    }

    pub fn payout(&self) -> Option<Money> {
        self.payout
    }

    pub fn is_perfect(&self) -> bool {
        self.perfect
    }

    pub fn can_cash_out(&self) -> bool {
        !self.status.is_terminal() && self.safe_reveals >= self.rules.min_reveals_to_cash_out
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            status: self.status,
            stake: self.stake,
            multiplier: self.multiplier,
            safe_reveals: self.safe_reveals,
            safe_cells: self.board.safe_cell_count(),
            grid_size: self.board.size(),
            bomb_probability: self.board.bomb_probability(),
            revealed: self.board.revealed_positions(),
            potential_payout: self.stake.apply_multiplier(self.multiplier),
            can_cash_out: self.can_cash_out(),
            payout: self.payout,
            perfect: self.perfect,
            created_at: self.created_at,
            ended_at: self.ended_at,
        }
    }

    /// Summary of a finished session; `None` while still active
    pub fn summary(&self) -> Option<SessionSummary> {
        let ended_at = self.ended_at?;
        Some(SessionSummary {
            session_id: self.id,
            player_id: self.player_id.clone(),
            stake: self.stake,
            payout: self.payout.unwrap_or(Money::ZERO),
            outcome: self.status,
            safe_reveals: self.safe_reveals,
            multiplier: self.multiplier,
            perfect: self.perfect,
            ended_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::random::SequenceRandom;

    fn player() -> PlayerContext {
        PlayerContext {
            player_id: "player-1".to_string(),
            username: "Tester".to_string(),
        }
    }

    fn safe_board(size: usize) -> Board {
        Board::generate(size, 0.0, &mut SequenceRandom::constant(0.5)).unwrap()
    }

    /// Row 0 is all bombs, everything else safe
    fn top_row_bombs(size: usize) -> Board {
        let mut samples = vec![0.0; size];
        samples.extend(std::iter::repeat(0.99).take(size * (size - 1)));
        Board::generate(size, 50.0, &mut SequenceRandom::new(samples)).unwrap()
    }

    fn start(board: Board, stake: u64, wallet: &mut WalletLedger, events: &EventLog) -> GameSession {
        GameSession::start(
            SessionId::new(),
            &player(),
            Money::from_units(stake),
            board,
            SessionRules::default(),
            wallet,
            events,
        )
        .unwrap()
    }

    #[test]
    fn test_cash_out_after_five_reveals() {
        let mut wallet = WalletLedger::new(Money::from_units(1_000));
        let events = EventLog::new();
        let mut session = start(safe_board(5), 100, &mut wallet, &events);
        assert_eq!(wallet.balance(), Money::from_units(900));

        for col in 0..4 {
            session.reveal(0, col, &mut wallet, &events).unwrap();
            assert!(!session.can_cash_out());
        }
        assert!(matches!(
            session.cash_out(&mut wallet, &events),
            Err(GameError::CashOutNotAllowed { safe_reveals: 4, required: 5 })
        ));

        session.reveal(0, 4, &mut wallet, &events).unwrap();
        assert_eq!(session.multiplier().to_string(), "1.25");

        let receipt = session.cash_out(&mut wallet, &events).unwrap();
        assert_eq!(receipt.payout, Money::from_units(125));
        assert_eq!(wallet.balance(), Money::from_units(1_025));
        assert_eq!(session.status(), SessionStatus::CashedOut);

        let kinds: Vec<EventKind> = events.events_for(&session.id()).iter().map(|e| e.kind).collect();
        assert_eq!(kinds.first(), Some(&EventKind::Started));
        assert_eq!(kinds.last(), Some(&EventKind::CashOut));
        assert_eq!(kinds.len(), 7);
    }

    #[test]
    fn test_start_rejects_stake_outside_bounds() {
        let mut wallet = WalletLedger::new(Money::from_units(5_000));
        let events = EventLog::new();
        let result = GameSession::start(
            SessionId::new(),
            &player(),
            Money::from_units(1_001),
            safe_board(3),
            SessionRules::default(),
            &mut wallet,
            &events,
        );

        assert!(matches!(result, Err(GameError::InvalidStake { .. })));
        assert_eq!(wallet.balance(), Money::from_units(5_000));
        assert_eq!(events.pending_count(), 0);
    }

    #[test]
    fn test_start_rejects_stake_above_balance() {
        let mut wallet = WalletLedger::new(Money::from_units(50));
        let events = EventLog::new();
        let result = GameSession::start(
            SessionId::new(),
            &player(),
            Money::from_units(100),
            safe_board(3),
            SessionRules::default(),
            &mut wallet,
            &events,
        );

        assert_eq!(
            result.unwrap_err(),
            GameError::InsufficientFunds {
                requested: Money::from_units(100),
                available: Money::from_units(50),
            }
        );
        assert_eq!(wallet.balance(), Money::from_units(50));
        assert_eq!(events.pending_count(), 0);
    }

    #[test]
    fn test_bomb_ends_session_without_credit() {
        let mut wallet = WalletLedger::new(Money::from_units(1_000));
        let events = EventLog::new();
        let mut session = start(top_row_bombs(4), 100, &mut wallet, &events);

        session.reveal(1, 1, &mut wallet, &events).unwrap();
        let outcome = session.reveal(0, 2, &mut wallet, &events).unwrap();
        assert_eq!(
            outcome,
            RevealOutcome::Bomb {
                position: CellPosition::new(0, 2),
                balance: Money::from_units(900),
            }
        );
        assert_eq!(session.status(), SessionStatus::BombHit);
        assert_eq!(wallet.total_credited(), Money::ZERO);

        let logged = events.events_for(&session.id()).len();
        assert_eq!(
            session.reveal(2, 2, &mut wallet, &events),
            Err(GameError::SessionAlreadyEnded(session.id()))
        );
        assert_eq!(
            session.cash_out(&mut wallet, &events),
            Err(GameError::SessionAlreadyEnded(session.id()))
        );
        assert_eq!(events.events_for(&session.id()).len(), logged);
        assert_eq!(wallet.balance(), Money::from_units(900));
    }

    #[test]
    fn test_perfect_game_resolves_automatically() {
        let mut wallet = WalletLedger::new(Money::from_units(1_000));
        let events = EventLog::new();
        // 3x3 with the top row mined leaves 6 safe cells, above the floor of 5
        let mut session = start(top_row_bombs(3), 100, &mut wallet, &events);

        let mut last = None;
        for row in 1..3 {
            for col in 0..3 {
                last = Some(session.reveal(row, col, &mut wallet, &events).unwrap());
            }
        }

        let expected = SessionRules::default().policy.multiplier_after(6);
        assert_eq!(
            last,
            Some(RevealOutcome::Perfect {
                position: CellPosition::new(2, 2),
                multiplier: expected,
                payout: Money::from_units(100).apply_multiplier(expected),
                balance: Money::from_units(1_030),
            })
        );
        assert!(session.is_perfect());
        assert_eq!(session.status(), SessionStatus::CashedOut);

        let last_event = events.events_for(&session.id()).pop().unwrap();
        assert_eq!(last_event.kind, EventKind::CashOut);
        assert!(last_event.payload.perfect);
    }

    #[test]
    fn test_perfect_game_ignores_floor() {
        let mut wallet = WalletLedger::new(Money::from_units(1_000));
        let events = EventLog::new();
        // 3x3 with bombs everywhere except (2, 2)
        let mut samples = vec![0.0; 8];
        samples.push(0.99);
        let board = Board::generate(3, 50.0, &mut SequenceRandom::new(samples)).unwrap();
        let mut session = start(board, 100, &mut wallet, &events);

        let outcome = session.reveal(2, 2, &mut wallet, &events).unwrap();
        assert!(matches!(outcome, RevealOutcome::Perfect { .. }));
        assert_eq!(wallet.balance(), Money::from_units(1_005));
    }

    #[test]
    fn test_snapshot_and_summary() {
        let mut wallet = WalletLedger::new(Money::from_units(1_000));
        let events = EventLog::new();
        let mut session = start(safe_board(3), 10, &mut wallet, &events);
        session.reveal(1, 1, &mut wallet, &events).unwrap();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.revealed, vec![CellPosition::new(1, 1)]);
        assert_eq!(snapshot.potential_payout, Money::from_cents(1_050));
        assert!(!snapshot.can_cash_out);
        assert!(session.summary().is_none());
    }
}
