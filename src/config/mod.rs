//! # Configuration Management Module
//!
//! Starfall reads a single TOML file with one section per concern:
//!
//! - [`GameConfig`] - world name and where new players spawn
//! - [`StorageConfig`] - data directory and the sled database path
//! - [`ContentConfig`] - directory holding the JSON content tables
//! - [`CombatConfig`] - turn timeout, flee chance, hit rules, hunt matching
//! - [`StaminaConfig`] - stamina pool and regeneration interval
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use starfall::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("config.toml").await?;
//!     let config = Config::load("config.toml").await?;
//!     println!("World: {}", config.game.name);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [game]
//! name = "Starfall"
//! start_area = "plains"
//! start_subarea = "pond"
//!
//! [storage]
//! data_dir = "./data"
//!
//! [combat]
//! turn_timeout_secs = 180
//! flee_chance = 0.5
//! dungeon_hit_rule = "always"
//! ```
//!
//! Every section except `[game]`, `[storage]` and `[logging]` may be omitted and
//! falls back to its defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::game::{GameRules, HitRule};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub name: String,
    pub start_area: String,
    pub start_subarea: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Optional override for the sled database path; defaults to `<data_dir>/starfall`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

impl StorageConfig {
    pub fn db_path(&self) -> PathBuf {
        match &self.db_path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(&self.data_dir).join("starfall"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_content_dir")]
    pub dir: String,
}

fn default_content_dir() -> String {
    "data/content".to_string()
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            dir: default_content_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatConfig {
    /// Seconds an encounter may wait for the next action before it is resolved as a flee.
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_secs: u64,
    #[serde(default = "default_flee_chance")]
    pub flee_chance: f64,
    /// `"always"` or `"accuracy"`. Hunts always roll accuracy against evasion.
    #[serde(default)]
    pub dungeon_hit_rule: HitRule,
    /// How far a mob's power may sit from the player's and still be preferred.
    #[serde(default = "default_power_padding")]
    pub hunt_power_padding: u32,
    #[serde(default = "default_auto_round_limit")]
    pub auto_round_limit: u32,
}

fn default_turn_timeout() -> u64 {
    180
}

fn default_flee_chance() -> f64 {
    0.5
}

fn default_power_padding() -> u32 {
    5
}

fn default_auto_round_limit() -> u32 {
    500
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: default_turn_timeout(),
            flee_chance: default_flee_chance(),
            dungeon_hit_rule: HitRule::Always,
            hunt_power_padding: default_power_padding(),
            auto_round_limit: default_auto_round_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaminaConfig {
    #[serde(default = "default_stamina_max")]
    pub max: u32,
    #[serde(default = "default_regen_secs")]
    pub regen_secs: u64,
}

fn default_stamina_max() -> u32 {
    200
}

fn default_regen_secs() -> u64 {
    180
}

impl Default for StaminaConfig {
    fn default() -> Self {
        Self {
            max: default_stamina_max(),
            regen_secs: default_regen_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub game: GameConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub combat: CombatConfig,
    #[serde(default)]
    pub stamina: StaminaConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.combat.flee_chance) {
            return Err(anyhow!(
                "combat.flee_chance must be between 0 and 1 (got {})",
                self.combat.flee_chance
            ));
        }
        if self.combat.turn_timeout_secs == 0 {
            return Err(anyhow!("combat.turn_timeout_secs must be greater than zero"));
        }
        if self.stamina.max == 0 || self.stamina.regen_secs == 0 {
            return Err(anyhow!("stamina.max and stamina.regen_secs must be greater than zero"));
        }
        if self.game.start_area.trim().is_empty() || self.game.start_subarea.trim().is_empty() {
            return Err(anyhow!("game.start_area and game.start_subarea must be set"));
        }
        Ok(())
    }

    /// Tunables handed to the game library.
    pub fn game_rules(&self) -> GameRules {
        GameRules {
            turn_timeout: Duration::from_secs(self.combat.turn_timeout_secs),
            flee_chance: self.combat.flee_chance,
            dungeon_hit_rule: self.combat.dungeon_hit_rule,
            hunt_power_padding: self.combat.hunt_power_padding,
            auto_round_limit: self.combat.auto_round_limit,
            stamina_regen_secs: self.stamina.regen_secs,
            max_stamina: self.stamina.max,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            game: GameConfig {
                name: "Starfall".to_string(),
                start_area: "plains".to_string(),
                start_subarea: "pond".to_string(),
            },
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                db_path: None,
            },
            content: ContentConfig::default(),
            combat: CombatConfig::default(),
            stamina: StaminaConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("starfall.log".to_string()),
            },
        }
    }
}
