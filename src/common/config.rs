//! Configuration loading for the Gridstake engine
//!
//! Reads TOML, applies `GRIDSTAKE_*` environment overrides and validates the
//! result before anything else sees it.

use crate::config::GameConfig;
use crate::errors::{ConfigurationError, GridstakeResult};
use crate::games::board::{MAX_BOARD_SIZE, MIN_BOARD_SIZE};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    config_path: Option<String>,
    base: GameConfig,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            base: GameConfig::default(),
        }
    }

    /// Start from a named profile instead of the defaults when no file is given
    pub fn with_profile(mut self, profile: GameConfig) -> Self {
        self.base = profile;
        self
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> GridstakeResult<GameConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => self.base.clone(),
        };

        self.apply_env_overrides(&mut config)?;
        validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> GridstakeResult<GameConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(&self, config: &mut GameConfig) -> GridstakeResult<()> {
        if let Ok(player_id) = env::var("GRIDSTAKE_PLAYER_ID") {
            config.player.player_id = player_id;
        }
        if let Ok(username) = env::var("GRIDSTAKE_USERNAME") {
            config.player.username = username;
        }
        if let Ok(balance) = env::var("GRIDSTAKE_STARTING_BALANCE") {
            config.wallet.starting_balance = parse_override("GRIDSTAKE_STARTING_BALANCE", &balance)?;
        }
        if let Ok(floor) = env::var("GRIDSTAKE_MIN_REVEALS") {
            config.cashout.min_reveals = parse_override("GRIDSTAKE_MIN_REVEALS", &floor)?;
        }
        if let Ok(endpoint) = env::var("GRIDSTAKE_SYNC_ENDPOINT") {
            config.sync.endpoint = Some(endpoint).filter(|e| !e.is_empty());
        }
        if let Ok(enabled) = env::var("GRIDSTAKE_SYNC_ENABLED") {
            config.sync.enabled = parse_override("GRIDSTAKE_SYNC_ENABLED", &enabled)?;
        }
        if let Ok(data_dir) = env::var("GRIDSTAKE_DATA_DIR") {
            config.storage.data_dir = data_dir;
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &GameConfig, path: &str) -> GridstakeResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_override<T: FromStr>(field: &str, value: &str) -> Result<T, ConfigurationError> {
    value.trim().parse().map_err(|_| ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: "could not be parsed".to_string(),
    })
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Validate configuration values
pub fn validate(config: &GameConfig) -> Result<(), ConfigurationError> {
    let grid = &config.grid;
    if grid.min_size < MIN_BOARD_SIZE || grid.max_size > MAX_BOARD_SIZE || grid.min_size > grid.max_size {
        return Err(invalid(
            "grid",
            format!("{}..={}", grid.min_size, grid.max_size),
            "grid bounds must lie within 3..=10",
        ));
    }
    if !(grid.min_size..=grid.max_size).contains(&grid.default_size) {
        return Err(invalid("grid.default_size", grid.default_size, "outside grid bounds"));
    }

    for probability in &config.bombs.allowed_probabilities {
        if !probability.is_finite() || !(0.0..=100.0).contains(probability) {
            return Err(invalid("bombs.allowed_probabilities", probability, "must be within 0..=100"));
        }
    }
    if !config.bombs.allows(config.bombs.default_probability) {
        return Err(invalid(
            "bombs.default_probability",
            config.bombs.default_probability,
            "not an allowed probability",
        ));
    }

    if config.wallet.min_stake > config.wallet.max_stake {
        return Err(invalid("wallet.min_stake", config.wallet.min_stake, "exceeds wallet.max_stake"));
    }

    if config.multiplier.increment.bps() == 0 {
        return Err(invalid("multiplier.increment", config.multiplier.increment, "must be positive"));
    }

    let sync = &config.sync;
    if sync.sink_timeout_ms == 0 {
        return Err(invalid("sync.sink_timeout_ms", 0, "timeout cannot be zero"));
    }
    if sync.initial_backoff_ms == 0 || sync.initial_backoff_ms > sync.max_backoff_ms {
        return Err(invalid(
            "sync.initial_backoff_ms",
            sync.initial_backoff_ms,
            "must be positive and not exceed sync.max_backoff_ms",
        ));
    }

    if config.storage.data_dir.is_empty() {
        return Err(ConfigurationError::MissingRequired("storage.data_dir".to_string()));
    }
    if config.player.player_id.trim().is_empty() {
        return Err(ConfigurationError::MissingRequired("player.player_id".to_string()));
    }

    Ok(())
}

/// Write the default configuration to `path`
pub fn generate_sample_config(path: &str) -> GridstakeResult<()> {
    let config = GameConfig::default();
    ConfigLoader::new().save(&config, path)
}
