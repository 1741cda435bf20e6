//! Starfall game library: player records, content tables, the combat engine and
//! everything built on top of it (hunts, dungeons, gathering, crafting, quests).

pub mod combat;
pub mod commands;
pub mod content;
pub mod crafting;
pub mod dice;
pub mod dungeon;
pub mod encounters;
pub mod equipment;
pub mod errors;
pub mod gathering;
pub mod hunt;
pub mod inventory;
pub mod npc;
pub mod progression;
pub mod quest;
pub mod storage;
pub mod types;

use std::time::Duration;

pub use combat::{resolve_attack, resolve_round, CombatEvent, CombatState, HitRule, PlayerAction};
pub use commands::{CommandProcessor, GameCommand};
pub use content::ContentTables;
pub use dice::{Dice, ScriptedDice};
pub use encounters::EncounterRegistry;
pub use errors::GameError;
pub use storage::{GameStore, GameStoreBuilder};
pub use types::{PlayerId, PlayerRecord};

/// Tunables shared by every encounter and gathering action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameRules {
    pub turn_timeout: Duration,
    pub flee_chance: f64,
    pub dungeon_hit_rule: HitRule,
    pub hunt_power_padding: u32,
    pub auto_round_limit: u32,
    pub stamina_regen_secs: u64,
    /// Stamina pool given to newly registered players.
    pub max_stamina: u32,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(180),
            flee_chance: 0.5,
            dungeon_hit_rule: HitRule::Always,
            hunt_power_padding: 5,
            auto_round_limit: 500,
            stamina_regen_secs: 180,
            max_stamina: types::DEFAULT_MAX_STAMINA,
        }
    }
}
