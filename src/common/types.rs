//! Shared type definitions for the Gridstake engine
//!
//! Money and multipliers are fixed-point so that repeated evaluation of the
//! same inputs always yields bit-identical results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Basis points per 1.0 multiplier
pub const MULTIPLIER_SCALE: u32 = 10_000;

const CENTS_PER_UNIT: u64 = 100;

/// Currency amount in minor units (cents)
///
/// Serializes as integer cents. Human-facing files use [`money_units`] and the
/// remote wire format converts with [`Money::to_decimal`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Whole currency units, e.g. `Money::from_units(100)` is `100.00`
    pub const fn from_units(units: u64) -> Self {
        Self(units.saturating_mul(CENTS_PER_UNIT))
    }

    pub const fn cents(self) -> u64 {
        self.0
    }

    /// Convert a decimal amount, rounding half-up to the nearest cent
    pub fn from_decimal(value: f64) -> Result<Self, String> {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("amount must be a non-negative number, got {}", value));
        }
        let cents = (value * CENTS_PER_UNIT as f64).round();
        if cents > u64::MAX as f64 {
            return Err(format!("amount {} is too large", value));
        }
        Ok(Self(cents as u64))
    }

    pub fn to_decimal(self) -> f64 {
        self.0 as f64 / CENTS_PER_UNIT as f64
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// `self * multiplier`, rounded half-up to the cent
    pub fn apply_multiplier(self, multiplier: Multiplier) -> Money {
        let scale = MULTIPLIER_SCALE as u128;
        let product = self.0 as u128 * multiplier.bps() as u128;
        let rounded = (product + scale / 2) / scale;
        Money(u64::try_from(rounded).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / CENTS_PER_UNIT, self.0 % CENTS_PER_UNIT)
    }
}

/// `#[serde(with = "money_units")]`: amounts written as decimal currency units,
/// for configuration files
pub mod money_units {
    use super::Money;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Money, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.to_decimal())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Money, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Money::from_decimal(value).map_err(serde::de::Error::custom)
    }
}

impl FromStr for Money {
    type Err = String;

    /// Parses `"125"`, `"125.5"` or `"125.50"` without going through floating point
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (units, fraction) = match s.split_once('.') {
            Some((units, fraction)) => (units, fraction),
            None => (s, ""),
        };

        if units.is_empty() || fraction.len() > 2 {
            return Err(format!("invalid amount '{}'", s));
        }

        let units: u64 = units
            .parse()
            .map_err(|_| format!("invalid amount '{}'", s))?;
        let fraction_cents: u64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| format!("invalid amount '{}'", s))? * 10,
            _ => fraction.parse().map_err(|_| format!("invalid amount '{}'", s))?,
        };

        units
            .checked_mul(CENTS_PER_UNIT)
            .and_then(|c| c.checked_add(fraction_cents))
            .map(Money)
            .ok_or_else(|| format!("amount '{}' is too large", s))
    }
}

/// Payout multiplier in basis points (`10_000` == 1.0x)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Multiplier(u32);

impl Multiplier {
    pub const ONE: Multiplier = Multiplier(MULTIPLIER_SCALE);
    pub const ZERO: Multiplier = Multiplier(0);

    pub const fn from_bps(bps: u32) -> Self {
        Self(bps)
    }

    pub const fn bps(self) -> u32 {
        self.0
    }

    /// Convert a decimal ratio, rounding to the nearest basis point
    pub fn from_decimal(value: f64) -> Result<Self, String> {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("multiplier must be a non-negative number, got {}", value));
        }
        let bps = (value * MULTIPLIER_SCALE as f64).round();
        if bps > u32::MAX as f64 {
            return Err(format!("multiplier {} is too large", value));
        }
        Ok(Self(bps as u32))
    }

    pub fn to_decimal(self) -> f64 {
        self.0 as f64 / MULTIPLIER_SCALE as f64
    }

    /// Value in hundredths, rounded half-up; used wherever a multiplier is reported
    pub fn hundredths(self) -> u32 {
        let step = MULTIPLIER_SCALE / 100;
        (self.0.saturating_add(step / 2)) / step
    }

    /// Two-decimal value for external reporting
    pub fn reported(self) -> f64 {
        self.hundredths() as f64 / 100.0
    }

    pub fn saturating_add(self, other: Multiplier) -> Multiplier {
        Multiplier(self.0.saturating_add(other.0))
    }

    pub fn saturating_mul(self, times: u32) -> Multiplier {
        Multiplier(self.0.saturating_mul(times))
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Multiplier::ONE
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hundredths = self.hundredths();
        write!(f, "{}.{:02}", hundredths / 100, hundredths % 100)
    }
}

impl TryFrom<f64> for Multiplier {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Multiplier::from_decimal(value)
    }
}

impl From<Multiplier> for f64 {
    fn from(value: Multiplier) -> Self {
        value.to_decimal()
    }
}

/// Opaque session token
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(SessionId)
    }
}

/// Grid coordinate, rendered as `"row-col"`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellPosition {
    pub row: usize,
    pub col: usize,
}

impl CellPosition {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.row, self.col)
    }
}

impl FromStr for CellPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (row, col) = s
            .trim()
            .split_once(|c: char| c == '-' || c == ',' || c.is_whitespace())
            .ok_or_else(|| format!("expected 'row-col', got '{}'", s))?;
        let row = row.trim().parse().map_err(|_| format!("invalid row in '{}'", s))?;
        let col = col.trim().parse().map_err(|_| format!("invalid column in '{}'", s))?;
        Ok(Self { row, col })
    }
}
