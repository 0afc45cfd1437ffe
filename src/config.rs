//! Deployment configuration with defaults and named profiles
//!
//! Nothing here is hardcoded into the engine: grid bounds, bomb rates, stake
//! limits, multiplier progression and the cash-out floor all differ between
//! deployments and are injected through [`GameConfig`].

use crate::common::types::{money_units, Money, Multiplier};
use crate::errors::GameResult;
use crate::games::multiplier::MultiplierPolicy;
use crate::games::session::SessionRules;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete engine configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub player: PlayerConfig,
    pub grid: GridConfig,
    pub bombs: BombConfig,
    pub wallet: WalletConfig,
    pub multiplier: MultiplierConfig,
    pub cashout: CashOutConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
}

impl GameConfig {
    /// Browser build: faster multiplier growth, cash out after a single reveal
    pub fn web() -> Self {
        Self {
            multiplier: MultiplierConfig {
                base: Multiplier::ONE,
                increment: Multiplier::from_bps(1_000),
            },
            cashout: CashOutConfig { min_reveals: 1 },
            ..Self::default()
        }
    }

    /// Mobile build: restricted bomb rates, slower growth, five reveals before cash out
    pub fn mobile() -> Self {
        Self {
            bombs: BombConfig {
                allowed_probabilities: vec![15.0, 25.0],
                default_probability: 15.0,
            },
            multiplier: MultiplierConfig {
                base: Multiplier::ONE,
                increment: Multiplier::from_bps(500),
            },
            cashout: CashOutConfig { min_reveals: 5 },
            ..Self::default()
        }
    }

    pub fn multiplier_policy(&self) -> GameResult<MultiplierPolicy> {
        MultiplierPolicy::new(self.multiplier.base, self.multiplier.increment)
    }

    /// Rules copied into every session at start
    pub fn session_rules(&self) -> GameResult<SessionRules> {
        Ok(SessionRules {
            policy: self.multiplier_policy()?,
            min_reveals_to_cash_out: self.cashout.min_reveals,
            min_stake: self.wallet.min_stake,
            max_stake: self.wallet.max_stake,
        })
    }
}

/// Player context the wallet and sessions belong to
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub player_id: String,
    pub username: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            player_id: "local-player".to_string(),
            username: "Player".to_string(),
        }
    }
}

/// Allowed grid sizes (the board itself supports 3..=10)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub default_size: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            min_size: 3,
            max_size: 10,
            default_size: 5,
        }
    }
}

/// Per-cell bomb probability in percent
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BombConfig {
    /// Empty means any value in `[0, 100]`
    pub allowed_probabilities: Vec<f64>,
    pub default_probability: f64,
}

impl Default for BombConfig {
    fn default() -> Self {
        Self {
            allowed_probabilities: Vec::new(),
            default_probability: 20.0,
        }
    }
}

impl BombConfig {
    pub fn allows(&self, probability: f64) -> bool {
        if !(0.0..=100.0).contains(&probability) {
            return false;
        }
        self.allowed_probabilities.is_empty()
            || self
                .allowed_probabilities
                .iter()
                .any(|allowed| (allowed - probability).abs() < f64::EPSILON)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    #[serde(with = "money_units")]
    pub starting_balance: Money,
    #[serde(with = "money_units")]
    pub min_stake: Money,
    #[serde(with = "money_units")]
    pub max_stake: Money,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            starting_balance: Money::from_units(1_000),
            min_stake: Money::from_units(1),
            max_stake: Money::from_units(1_000),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplierConfig {
    pub base: Multiplier,
    pub increment: Multiplier,
}

impl Default for MultiplierConfig {
    fn default() -> Self {
        Self {
            base: Multiplier::ONE,
            increment: Multiplier::from_bps(500),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CashOutConfig {
    /// Safe reveals required before a voluntary cash out
    pub min_reveals: u32,
}

impl Default for CashOutConfig {
    fn default() -> Self {
        Self { min_reveals: 5 }
    }
}

/// Background delivery of session events to the remote sink
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    /// Base URL of the session backend, e.g. `http://localhost:8000/api`
    pub endpoint: Option<String>,
    pub flush_interval_ms: u64,
    pub sink_timeout_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            flush_interval_ms: 5_000,
            sink_timeout_ms: 3_000,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
        }
    }
}

impl SyncConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./DB/gridstake".to_string(),
        }
    }
}
