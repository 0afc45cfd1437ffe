//! Player wallet ledger
//!
//! A single balance per player context. Sessions debit the stake once at start
//! and credit the payout once at resolution; a bomb hit credits nothing.

use crate::common::types::Money;
use crate::errors::{GameError, GameResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletLedger {
    balance: Money,
    /// Balance the ledger was opened with
    opening_balance: Money,
    total_debited: Money,
    total_credited: Money,
}

impl WalletLedger {
    pub fn new(opening_balance: Money) -> Self {
        Self {
            balance: opening_balance,
            opening_balance,
            total_debited: Money::ZERO,
            total_credited: Money::ZERO,
        }
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn opening_balance(&self) -> Money {
        self.opening_balance
    }

    pub fn total_debited(&self) -> Money {
        self.total_debited
    }

    pub fn total_credited(&self) -> Money {
        self.total_credited
    }

    /// Remove `amount`; fails without mutating if it exceeds the balance
    pub fn debit(&mut self, amount: Money) -> GameResult<Money> {
        let remaining = self
            .balance
            .checked_sub(amount)
            .ok_or(GameError::InsufficientFunds {
                requested: amount,
                available: self.balance,
            })?;

        self.balance = remaining;
        self.total_debited = self.total_debited.saturating_add(amount);
        tracing::debug!(amount = %amount, balance = %self.balance, "Wallet debited");
        Ok(self.balance)
    }

    pub fn credit(&mut self, amount: Money) -> Money {
        self.balance = self.balance.saturating_add(amount);
        self.total_credited = self.total_credited.saturating_add(amount);
        tracing::debug!(amount = %amount, balance = %self.balance, "Wallet credited");
        self.balance
    }

    /// `opening - debits + credits == balance`
    pub fn is_consistent(&self) -> bool {
        self.opening_balance
            .saturating_add(self.total_credited)
            .checked_sub(self.total_debited)
            == Some(self.balance)
    }
}
