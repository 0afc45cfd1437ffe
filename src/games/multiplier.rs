use crate::common::types::Multiplier;
use crate::errors::{GameError, GameResult};
use serde::{Deserialize, Serialize};

/// Linear multiplier progression: `base + safe_reveals * increment`.
///
/// Computed in basis points, so equal inputs always produce identical
/// outputs. Rounding to two decimals happens only when a value is reported
/// or applied to a stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplierPolicy {
    base: Multiplier,
    increment: Multiplier,
}

impl MultiplierPolicy {
    /// Fails with `InvalidConfiguration` for a zero increment, which would
    /// leave the multiplier flat
    pub fn new(base: Multiplier, increment: Multiplier) -> GameResult<Self> {
        if increment == Multiplier::ZERO {
            return Err(GameError::InvalidConfiguration(
                "multiplier increment must be positive".to_string(),
            ));
        }
        Ok(Self { base, increment })
    }

    pub fn base(&self) -> Multiplier {
        self.base
    }

    pub fn increment(&self) -> Multiplier {
        self.increment
    }

    pub fn multiplier_after(&self, safe_reveals: u32) -> Multiplier {
        self.base.saturating_add(self.increment.saturating_mul(safe_reveals))
    }
}

impl Default for MultiplierPolicy {
    fn default() -> Self {
        Self {
            base: Multiplier::ONE,
            increment: Multiplier::from_bps(500),
        }
    }
}
