//! Configuration management with validation and defaults
//!
//! Settings come from an optional TOML file, then `WAGERBOT_*` environment
//! overrides, then validation.

use crate::errors::{BotResult, ConfigurationError};
use crate::games::types::GameKind;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Complete bot configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub games: GamesConfig,
    pub ledger: LedgerConfig,
    pub dice: DiceConfig,
    pub storage: StorageConfig,
    pub dispatch: DispatchConfig,
    pub moderation: ModerationConfig,
    pub monitoring: MonitoringConfig,
}

/// Timed betting games
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GamesConfig {
    pub roulette_window_ms: u64,
    pub crash_window_ms: u64,
    pub dream_window_ms: u64,
    /// Re-arming never pushes expiry past creation + this lifetime
    pub max_round_lifetime_ms: u64,
    /// Pause between the "bets closed" notice and the results
    pub results_delay_ms: u64,
    pub min_wager: i64,
    pub max_wager: i64,
}

impl Default for GamesConfig {
    fn default() -> Self {
        Self {
            roulette_window_ms: 5_000,
            crash_window_ms: 10_000,
            dream_window_ms: 15_000,
            max_round_lifetime_ms: 120_000,
            results_delay_ms: 2_000,
            min_wager: 10,
            max_wager: 1_000_000_000_000,
        }
    }
}

/// Balance and bonus settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub bonus_min: i64,
    pub bonus_max: i64,
    pub bonus_cooldown_minutes: i64,
    pub leaderboard_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            bonus_min: 1_000_000,
            bonus_max: 5_000_000,
            bonus_cooldown_minutes: 60,
            leaderboard_size: 10,
        }
    }
}

/// Dice lobby settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DiceConfig {
    pub idle_timeout_secs: u64,
    pub max_lobbies_per_chat: usize,
    pub min_seats: usize,
    pub max_seats: usize,
    pub default_seats: usize,
}

impl Default for DiceConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            max_lobbies_per_chat: 5,
            min_seats: 2,
            max_seats: 4,
            default_seats: 2,
        }
    }
}

/// RocksDB settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    /// Whether to clear database on startup (testing only!)
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_directory: "./DB/wagerbot_data".to_string(),
            write_buffer_size_mb: 32,
            clear_on_start: false,
        }
    }
}

/// Inbound event worker pool
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            queue_capacity: 1_024,
        }
    }
}

/// Moderation gate settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    pub admins: Vec<i64>,
    pub warn_limit: u32,
    pub warn_mute_minutes: i64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            admins: vec![],
            warn_limit: 3,
            warn_mute_minutes: 60,
        }
    }
}

/// Logging and status server settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_filter: String,
    pub status_host: String,
    /// Status server is disabled when unset
    pub status_port: Option<u16>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_filter: "wagerbot=info,tower_http=info".to_string(),
            status_host: "127.0.0.1".to_string(),
            status_port: None,
        }
    }
}

impl GamesConfig {
    /// Betting window for a timed game kind
    pub fn window(&self, kind: GameKind) -> Duration {
        let ms = match kind {
            GameKind::Roulette => self.roulette_window_ms,
            GameKind::Crash => self.crash_window_ms,
            GameKind::Dream => self.dream_window_ms,
            GameKind::Dice => 0,
        };
        Duration::from_millis(ms)
    }

    pub fn max_round_lifetime(&self) -> Duration {
        Duration::from_millis(self.max_round_lifetime_ms)
    }

    pub fn results_delay(&self) -> Duration {
        Duration::from_millis(self.results_delay_ms)
    }
}

impl DiceConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl BotConfig {
    /// Configuration for tests: short windows, no results delay, throwaway DB
    pub fn for_testing(data_directory: &str) -> Self {
        Self {
            games: GamesConfig {
                roulette_window_ms: 50,
                crash_window_ms: 50,
                dream_window_ms: 50,
                max_round_lifetime_ms: 1_000,
                results_delay_ms: 0,
                ..Default::default()
            },
            storage: StorageConfig {
                data_directory: data_directory.to_string(),
                clear_on_start: true,
                ..Default::default()
            },
            dispatch: DispatchConfig {
                workers: 2,
                queue_capacity: 16,
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let games = &self.games;
        for kind in GameKind::TIMED {
            if games.window(kind).is_zero() {
                return Err(invalid(&format!("games.{}_window_ms", kind), "0", "Window cannot be zero"));
            }
            if games.max_round_lifetime() < games.window(kind) {
                return Err(invalid(
                    "games.max_round_lifetime_ms",
                    &games.max_round_lifetime_ms.to_string(),
                    "Lifetime must cover at least one betting window",
                ));
            }
        }
        if games.min_wager <= 0 {
            return Err(invalid("games.min_wager", &games.min_wager.to_string(), "Must be positive"));
        }
        if games.min_wager > games.max_wager {
            return Err(ConfigurationError::ValidationFailed(
                "games.min_wager exceeds games.max_wager".to_string(),
            ));
        }

        let ledger = &self.ledger;
        if ledger.bonus_min <= 0 || ledger.bonus_min > ledger.bonus_max {
            return Err(ConfigurationError::ValidationFailed(format!(
                "bonus range {}..={} is invalid",
                ledger.bonus_min, ledger.bonus_max
            )));
        }
        if ledger.bonus_cooldown_minutes < 0 {
            return Err(invalid(
                "ledger.bonus_cooldown_minutes",
                &ledger.bonus_cooldown_minutes.to_string(),
                "Cannot be negative",
            ));
        }

        let dice = &self.dice;
        if dice.min_seats < 2 || dice.max_seats > 4 || dice.min_seats > dice.max_seats {
            return Err(ConfigurationError::ValidationFailed(format!(
                "dice seats {}..={} must lie within 2..=4",
                dice.min_seats, dice.max_seats
            )));
        }
        if !(dice.min_seats..=dice.max_seats).contains(&dice.default_seats) {
            return Err(invalid(
                "dice.default_seats",
                &dice.default_seats.to_string(),
                "Must lie within the seat bounds",
            ));
        }
        if dice.idle_timeout_secs == 0 {
            return Err(invalid("dice.idle_timeout_secs", "0", "Timeout cannot be zero"));
        }
        if dice.max_lobbies_per_chat == 0 {
            return Err(invalid("dice.max_lobbies_per_chat", "0", "Cannot be zero"));
        }

        if self.storage.data_directory.is_empty() {
            return Err(ConfigurationError::MissingRequired("storage.data_directory".to_string()));
        }

        if self.dispatch.workers == 0 {
            return Err(invalid("dispatch.workers", "0", "Need at least one worker"));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(invalid("dispatch.queue_capacity", "0", "Queue cannot be zero-sized"));
        }

        if self.moderation.warn_limit == 0 {
            return Err(invalid("moderation.warn_limit", "0", "Cannot be zero"));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> BotResult<BotConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => BotConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> BotResult<BotConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(&self, config: &mut BotConfig) -> BotResult<()> {
        if let Ok(data_dir) = env::var("WAGERBOT_DATA_DIR") {
            config.storage.data_directory = data_dir;
        }
        if let Ok(workers) = env::var("WAGERBOT_WORKERS") {
            config.dispatch.workers = workers.parse().map_err(|_| ConfigurationError::InvalidValue {
                field: "WAGERBOT_WORKERS".to_string(),
                value: workers,
                reason: "Invalid worker count".to_string(),
            })?;
        }
        if let Ok(port) = env::var("WAGERBOT_STATUS_PORT") {
            let parsed = port.parse().map_err(|_| ConfigurationError::InvalidValue {
                field: "WAGERBOT_STATUS_PORT".to_string(),
                value: port,
                reason: "Invalid port number".to_string(),
            })?;
            config.monitoring.status_port = Some(parsed);
        }
        if let Ok(filter) = env::var("WAGERBOT_LOG") {
            config.monitoring.log_filter = filter;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &BotConfig, path: &str) -> BotResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config(path: &str) -> BotResult<()> {
    ConfigLoader::new().save(&BotConfig::default(), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        assert!(BotConfig::default().validate().is_ok());
        assert!(BotConfig::for_testing("./DB/test").validate().is_ok());
    }

    #[test]
    fn test_default_windows() {
        let games = GamesConfig::default();
        assert_eq!(games.window(GameKind::Roulette), Duration::from_secs(5));
        assert_eq!(games.window(GameKind::Crash), Duration::from_secs(10));
        assert_eq!(games.window(GameKind::Dream), Duration::from_secs(15));
        assert_eq!(DiceConfig::default().idle_timeout(), Duration::from_secs(1800));
    }

    #[test]
    fn test_invalid_wager_bounds() {
        let mut config = BotConfig::default();
        config.games.min_wager = 500;
        config.games.max_wager = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lifetime_must_cover_window() {
        let mut config = BotConfig::default();
        config.games.max_round_lifetime_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dice_seat_bounds() {
        let mut config = BotConfig::default();
        config.dice.max_seats = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_config() -> BotResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let mut original = BotConfig::default();
        original.moderation.admins = vec![42];
        original.games.crash_window_ms = 12_000;
        ConfigLoader::new().save(&original, path)?;

        let loaded = ConfigLoader::new().with_path(path).load()?;
        assert_eq!(loaded.moderation.admins, vec![42]);
        assert_eq!(loaded.games.crash_window_ms, 12_000);
        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: BotConfig = toml::from_str("[dice]\nmax_lobbies_per_chat = 3\n").unwrap();
        assert_eq!(parsed.dice.max_lobbies_per_chat, 3);
        assert_eq!(parsed.games.roulette_window_ms, 5_000);
    }
}
