//! Session summaries and house profitability reporting

use crate::common::types::{Money, Multiplier, SessionId};
use crate::games::types::SessionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Share of total stakes retained as commission (10%)
pub const DEFAULT_COMMISSION_RATE: Multiplier = Multiplier::from_bps(1_000);

/// Final result of one finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub player_id: String,
    pub stake: Money,
    /// Total winnings; zero on a bomb hit
    pub payout: Money,
    pub outcome: SessionStatus,
    pub safe_reveals: u32,
    pub multiplier: Multiplier,
    pub perfect: bool,
    pub ended_at: DateTime<Utc>,
}

impl SessionSummary {
    /// Player's net result in cents
    pub fn net_cents(&self) -> i64 {
        self.payout.cents() as i64 - self.stake.cents() as i64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseReport {
    pub sessions: usize,
    pub cashed_out: usize,
    pub bomb_hits: usize,
    pub perfect_games: usize,
    pub total_stakes: Money,
    pub total_payouts: Money,
    pub commission: Money,
    /// `stakes - payouts - commission`, in cents; negative when the house lost
    pub house_profit_cents: i64,
    /// `house_profit / stakes * 100`, rounded to two decimals
    pub profit_percentage: f64,
}

impl HouseReport {
    pub fn from_summaries(summaries: &[SessionSummary], commission_rate: Multiplier) -> Self {
        let mut report = HouseReport {
            sessions: summaries.len(),
            cashed_out: 0,
            bomb_hits: 0,
            perfect_games: 0,
            total_stakes: Money::ZERO,
            total_payouts: Money::ZERO,
            commission: Money::ZERO,
            house_profit_cents: 0,
            profit_percentage: 0.0,
        };

        for summary in summaries {
            match summary.outcome {
                SessionStatus::CashedOut => report.cashed_out += 1,
                SessionStatus::BombHit => report.bomb_hits += 1,
                SessionStatus::Active => {}
            }
            if summary.perfect {
                report.perfect_games += 1;
            }
            report.total_stakes = report.total_stakes.saturating_add(summary.stake);
            report.total_payouts = report.total_payouts.saturating_add(summary.payout);
        }

        report.commission = report.total_stakes.apply_multiplier(commission_rate);
        report.house_profit_cents = report.total_stakes.cents() as i64
            - report.total_payouts.cents() as i64
            - report.commission.cents() as i64;

        if report.total_stakes > Money::ZERO {
            let ratio = report.house_profit_cents as f64 / report.total_stakes.cents() as f64;
            report.profit_percentage = (ratio * 10_000.0).round() / 100.0;
        }

        report
    }
}
