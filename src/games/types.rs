use crate::common::types::{CellPosition, Money, Multiplier, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a game session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    CashedOut,
    BombHit,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "ACTIVE"),
            SessionStatus::CashedOut => write!(f, "CASHED_OUT"),
            SessionStatus::BombHit => write!(f, "BOMB_HIT"),
        }
    }
}

/// Session lifecycle event types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    #[serde(rename = "GAME_STARTED")]
    Started,
    #[serde(rename = "FLIP")]
    Flip,
    #[serde(rename = "CASHOUT")]
    CashOut,
    #[serde(rename = "BOMB_HIT")]
    BombHit,
}

impl EventKind {
    /// Name used on the wire by the session backend
    pub fn wire_name(self) -> &'static str {
        match self {
            EventKind::Started => "GAME_STARTED",
            EventKind::Flip => "FLIP",
            EventKind::CashOut => "CASHOUT",
            EventKind::BombHit => "BOMB_HIT",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EventKind::CashOut | EventKind::BombHit)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Optional fields carried by an event
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<CellPosition>,
    /// Stake for `Started`, payout for `CashOut`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Money>,
    /// Wallet balance after the transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<Multiplier>,
    /// Set on the cash out produced by revealing every safe cell
    #[serde(default)]
    pub perfect: bool,
}

/// One entry of a session's event stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameEvent {
    /// Log-wide insertion sequence
    pub seq: u64,
    pub session_id: SessionId,
    pub kind: EventKind,
    pub payload: EventPayload,
    pub timestamp: DateTime<Utc>,
    pub synced: bool,
}

/// Data the remote backend needs to open a session record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRegistration {
    pub session_id: SessionId,
    pub player_id: String,
    pub username: String,
    /// Wallet balance before the stake was debited
    pub starting_balance: Money,
    pub grid_size: usize,
    pub bomb_probability: f64,
    pub stake: Money,
}

/// Token the remote backend assigned to a registered session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RemoteSessionToken(pub String);

impl fmt::Display for RemoteSessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a successful `reveal` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum RevealOutcome {
    /// Safe cell; the session stays active
    Safe {
        position: CellPosition,
        multiplier: Multiplier,
        safe_reveals: u32,
    },
    /// Bomb; the stake is forfeited
    Bomb {
        position: CellPosition,
        balance: Money,
    },
    /// Last safe cell; resolved automatically as a cash out
    Perfect {
        position: CellPosition,
        multiplier: Multiplier,
        payout: Money,
        balance: Money,
    },
}

impl RevealOutcome {
    pub fn position(&self) -> CellPosition {
        match self {
            RevealOutcome::Safe { position, .. }
            | RevealOutcome::Bomb { position, .. }
            | RevealOutcome::Perfect { position, .. } => *position,
        }
    }

    pub fn ends_session(&self) -> bool {
        !matches!(self, RevealOutcome::Safe { .. })
    }
}

/// Result of a successful voluntary cash out
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CashOutReceipt {
    pub session_id: SessionId,
    pub stake: Money,
    pub multiplier: Multiplier,
    pub payout: Money,
    pub balance: Money,
}

/// Read-only view of a session for callers that poll after each operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub stake: Money,
    pub multiplier: Multiplier,
    pub safe_reveals: u32,
    pub safe_cells: usize,
    pub grid_size: usize,
    pub bomb_probability: f64,
    pub revealed: Vec<CellPosition>,
    /// Payout a cash out would produce right now
    pub potential_payout: Money,
    pub can_cash_out: bool,
    pub payout: Option<Money>,
    pub perfect: bool,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}
