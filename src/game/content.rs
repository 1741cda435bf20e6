//! Read-only game content loaded from JSON tables in `data/content/`.
//!
//! Tables are loaded once at startup and shared immutably. Each file is optional;
//! an absent file yields an empty table so partial content sets still boot. The
//! shipped defaults are also compiled in (`ContentTables::builtin`) for tests and
//! for the `status` command.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::ops::AddAssign;
use std::path::Path;

use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::game::errors::GameError;
use crate::game::types::{CollectionKind, GearSlot, ObjectiveKind, Skill};

// ============================================================================
// Mobs
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MobStats {
    pub hp: u32,
    #[serde(rename = "str")]
    pub strength: u32,
    #[serde(rename = "def")]
    pub defense: u32,
    #[serde(rename = "eva")]
    pub evasion: u32,
    #[serde(rename = "acc")]
    pub accuracy: u32,
}

impl MobStats {
    /// Power rating of a mob, HP excluded.
    pub fn power(&self) -> u32 {
        self.strength + self.defense + self.evasion + self.accuracy
    }
}

/// Determines the mob's action probability table.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MobBehavior {
    #[default]
    Aggressive,
    Ranged,
    #[serde(other)]
    Other,
}

impl MobBehavior {
    /// Chance per turn to begin a telegraphed special attack.
    pub fn special_chance(self) -> f64 {
        match self {
            MobBehavior::Aggressive => 0.15,
            MobBehavior::Ranged => 0.25,
            MobBehavior::Other => 0.10,
        }
    }

    /// Chance per turn to take a defensive stance.
    pub fn defend_chance(self) -> f64 {
        match self {
            MobBehavior::Aggressive => 0.10,
            MobBehavior::Ranged => 0.20,
            MobBehavior::Other => 0.30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecialAttack {
    pub name: String,
    pub telegraph_turns: u32,
    pub damage_multiplier: f64,
    #[serde(default)]
    pub description: String,
}

impl Default for SpecialAttack {
    fn default() -> Self {
        Self {
            name: "Power Attack".to_string(),
            telegraph_turns: 1,
            damage_multiplier: 2.0,
            description: "charges up a powerful attack!".to_string(),
        }
    }
}

fn default_quantity() -> [u32; 2] {
    [1, 1]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LootEntry {
    pub item: String,
    pub chance: f64,
    #[serde(default = "default_quantity")]
    pub quantity: [u32; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MobTemplate {
    pub name: String,
    pub stats: MobStats,
    #[serde(default)]
    pub behavior: MobBehavior,
    #[serde(default)]
    pub xp: u32,
    #[serde(default)]
    pub gold: [u32; 2],
    #[serde(default)]
    pub loot_table: Vec<LootEntry>,
    #[serde(default)]
    pub special_attacks: Vec<SpecialAttack>,
}

// ============================================================================
// World, items and gear
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubareaDef {
    #[serde(default)]
    pub mobs: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AreaDef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sub_areas: BTreeMap<String, SubareaDef>,
}

fn default_item_xp() -> u32 {
    1
}

fn default_item_weight() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemDef {
    pub name: String,
    /// Gathering skill that yields this item (`mining`, `fishing`...) or `loot`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_item_xp")]
    pub xp: u32,
    #[serde(default = "default_item_weight")]
    pub weight: u32,
    /// Overrides the collection fed by the gathering skill.
    #[serde(default)]
    pub collection: Option<CollectionKind>,
}

/// Stat block carried by gear templates and set bonuses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GearStats {
    #[serde(rename = "STR", default)]
    pub strength: u32,
    #[serde(rename = "DEF", default)]
    pub defense: u32,
    #[serde(rename = "EVA", default)]
    pub evasion: u32,
    #[serde(rename = "ACC", default)]
    pub accuracy: u32,
    #[serde(rename = "HP", default)]
    pub hp: u32,
    #[serde(rename = "CRITPER", default)]
    pub crit_chance: f64,
    #[serde(rename = "SKILL", default)]
    pub skill_bonus: f64,
    #[serde(default)]
    pub yield_multiplier: Option<f64>,
    #[serde(default)]
    pub extra_roll_chance: Option<f64>,
}

impl AddAssign<&GearStats> for GearStats {
    fn add_assign(&mut self, rhs: &GearStats) {
        self.strength += rhs.strength;
        self.defense += rhs.defense;
        self.evasion += rhs.evasion;
        self.accuracy += rhs.accuracy;
        self.hp += rhs.hp;
        self.crit_chance += rhs.crit_chance;
        self.skill_bonus += rhs.skill_bonus;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemTemplate {
    pub name: String,
    #[serde(default)]
    pub equip_slots: Vec<GearSlot>,
    #[serde(default)]
    pub stats: GearStats,
    #[serde(default)]
    pub set: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetBonus {
    pub pieces: u32,
    pub stats: GearStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetDef {
    pub name: String,
    #[serde(default)]
    pub bonuses: Vec<SetBonus>,
}

// ============================================================================
// Dungeons
// ============================================================================

fn default_room_kind() -> String {
    "combat".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomDef {
    #[serde(rename = "type", default = "default_room_kind")]
    pub kind: String,
}

impl RoomDef {
    pub fn is_combat(&self) -> bool {
        self.kind == "combat"
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DungeonFloor {
    #[serde(default)]
    pub rooms: Vec<RoomDef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DungeonPool {
    #[serde(default)]
    pub mobs: Vec<String>,
}

// ============================================================================
// Crafting and quests
// ============================================================================

fn default_output_qty() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recipe {
    pub ingredients: BTreeMap<String, u32>,
    #[serde(default = "default_output_qty")]
    pub output_qty: u32,
}

fn default_objective_amount() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectiveDef {
    #[serde(rename = "type")]
    pub kind: ObjectiveKind,
    pub target: String,
    #[serde(default = "default_objective_amount")]
    pub amount: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestRewards {
    #[serde(default)]
    pub gold: u64,
    #[serde(default)]
    pub xp: u32,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub recipes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestDef {
    pub quest_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub objectives: Vec<ObjectiveDef>,
    #[serde(default)]
    pub rewards: QuestRewards,
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

// ============================================================================
// NPCs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DialogueChoice {
    pub label: String,
    /// Node to move to; absent or `end` closes the conversation.
    #[serde(default)]
    pub next: Option<String>,
    /// Parting line shown when the choice closes the conversation.
    #[serde(default)]
    pub text: Option<String>,
    /// Quest handed to the player when this choice is picked.
    #[serde(default)]
    pub give_quest: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DialogueNode {
    pub text: String,
    #[serde(default)]
    pub lore: Option<String>,
    #[serde(default)]
    pub options: Vec<DialogueChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NpcDef {
    pub name: String,
    pub area: String,
    pub sub_area: String,
    #[serde(default)]
    pub dialogue: BTreeMap<String, DialogueNode>,
}

// On-disk wrappers for the tables that nest under a single key.

#[derive(Debug, Default, Deserialize)]
struct MobsFile {
    #[serde(default)]
    mobs: HashMap<String, MobTemplate>,
}

#[derive(Debug, Default, Deserialize)]
struct ItemsFile {
    #[serde(default)]
    items: HashMap<String, ItemDef>,
}

#[derive(Debug, Default, Deserialize)]
struct FloorsFile {
    #[serde(default)]
    floors: BTreeMap<String, DungeonFloor>,
}

#[derive(Debug, Default, Deserialize)]
struct QuestsFile {
    #[serde(default)]
    quests: Vec<QuestDef>,
}

/// All static content tables.
#[derive(Debug, Clone, Default)]
pub struct ContentTables {
    pub mobs: HashMap<String, MobTemplate>,
    pub areas: BTreeMap<String, AreaDef>,
    pub items: HashMap<String, ItemDef>,
    pub item_templates: HashMap<String, ItemTemplate>,
    pub sets: HashMap<String, SetDef>,
    pub dungeon_floors: BTreeMap<String, DungeonFloor>,
    pub dungeon_pools: HashMap<String, DungeonPool>,
    pub dungeon_mobs: HashMap<String, MobTemplate>,
    pub recipes: BTreeMap<String, Recipe>,
    /// collection key -> tier -> recipe keys unlocked at that tier
    pub collections: HashMap<String, BTreeMap<String, Vec<String>>>,
    pub quests: Vec<QuestDef>,
    pub npcs: BTreeMap<String, NpcDef>,
}

fn parse_table<T: DeserializeOwned>(label: &str, contents: &str) -> Result<T, GameError> {
    serde_json::from_str(contents).map_err(|e| {
        error!("failed to parse content table {}: {}", label, e);
        GameError::Json(e)
    })
}

fn read_table<T: DeserializeOwned + Default>(dir: &Path, file: &str) -> Result<T, GameError> {
    let path = dir.join(file);
    if !path.exists() {
        warn!("content table {} not found; using an empty table", path.display());
        return Ok(T::default());
    }
    let contents = fs::read_to_string(&path)?;
    parse_table(&path.display().to_string(), &contents)
}

impl ContentTables {
    /// Load every table from `dir`.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self, GameError> {
        let dir = dir.as_ref();
        debug!("loading content tables from {}", dir.display());
        let mobs: MobsFile = read_table(dir, "mobs.json")?;
        let items: ItemsFile = read_table(dir, "items.json")?;
        let floors: FloorsFile = read_table(dir, "dungeon_floors.json")?;
        let quests: QuestsFile = read_table(dir, "quests.json")?;
        Ok(Self {
            mobs: mobs.mobs,
            areas: read_table(dir, "areas.json")?,
            items: items.items,
            item_templates: read_table(dir, "item_templates.json")?,
            sets: read_table(dir, "sets.json")?,
            dungeon_floors: floors.floors,
            dungeon_pools: read_table(dir, "dungeon_pools.json")?,
            dungeon_mobs: read_table(dir, "dungeon_mobs.json")?,
            recipes: read_table(dir, "recipes.json")?,
            collections: read_table(dir, "collections.json")?,
            quests: quests.quests,
            npcs: read_table(dir, "npcs.json")?,
        })
    }

    /// The default content set shipped in `data/content/`, compiled into the binary.
    pub fn builtin() -> Result<Self, GameError> {
        let mobs: MobsFile = parse_table("mobs.json", include_str!("../../data/content/mobs.json"))?;
        let items: ItemsFile =
            parse_table("items.json", include_str!("../../data/content/items.json"))?;
        let floors: FloorsFile = parse_table(
            "dungeon_floors.json",
            include_str!("../../data/content/dungeon_floors.json"),
        )?;
        let quests: QuestsFile =
            parse_table("quests.json", include_str!("../../data/content/quests.json"))?;
        Ok(Self {
            mobs: mobs.mobs,
            areas: parse_table("areas.json", include_str!("../../data/content/areas.json"))?,
            items: items.items,
            item_templates: parse_table(
                "item_templates.json",
                include_str!("../../data/content/item_templates.json"),
            )?,
            sets: parse_table("sets.json", include_str!("../../data/content/sets.json"))?,
            dungeon_floors: floors.floors,
            dungeon_pools: parse_table(
                "dungeon_pools.json",
                include_str!("../../data/content/dungeon_pools.json"),
            )?,
            dungeon_mobs: parse_table(
                "dungeon_mobs.json",
                include_str!("../../data/content/dungeon_mobs.json"),
            )?,
            recipes: parse_table("recipes.json", include_str!("../../data/content/recipes.json"))?,
            collections: parse_table(
                "collections.json",
                include_str!("../../data/content/collections.json"),
            )?,
            quests: quests.quests,
            npcs: parse_table("npcs.json", include_str!("../../data/content/npcs.json"))?,
        })
    }

    pub fn mob(&self, mob_id: &str) -> Result<&MobTemplate, GameError> {
        self.mobs
            .get(mob_id)
            .ok_or_else(|| GameError::MissingContent(format!("mob {}", mob_id)))
    }

    pub fn dungeon_mob(&self, mob_id: &str) -> Result<&MobTemplate, GameError> {
        self.dungeon_mobs
            .get(mob_id)
            .ok_or_else(|| GameError::MissingContent(format!("dungeon mob {}", mob_id)))
    }

    pub fn subarea(&self, area: &str, subarea: &str) -> Option<&SubareaDef> {
        self.areas
            .get(&area.to_ascii_lowercase())
            .and_then(|a| a.sub_areas.get(&subarea.to_ascii_lowercase()))
    }

    /// Mobs that roam a subarea, resolved against the mob table. Unknown ids are skipped.
    pub fn area_mobs(&self, area: &str, subarea: &str) -> Vec<(&str, &MobTemplate)> {
        let Some(sub) = self.subarea(area, subarea) else {
            return Vec::new();
        };
        sub.mobs
            .iter()
            .filter_map(|id| self.mobs.get(id).map(|mob| (id.as_str(), mob)))
            .collect()
    }

    pub fn floor(&self, floor: u32) -> Result<&DungeonFloor, GameError> {
        self.dungeon_floors
            .get(&floor.to_string())
            .ok_or_else(|| GameError::MissingContent(format!("dungeon floor {}", floor)))
    }

    pub fn floor_pool(&self, floor: u32) -> Result<&[String], GameError> {
        match self.dungeon_pools.get(&format!("floor_{}", floor)) {
            Some(pool) if !pool.mobs.is_empty() => Ok(&pool.mobs),
            _ => Err(GameError::MissingContent(format!(
                "no enemies configured for floor {}",
                floor
            ))),
        }
    }

    pub fn item(&self, key: &str) -> Option<&ItemDef> {
        self.items.get(key)
    }

    pub fn template(&self, key: &str) -> Option<&ItemTemplate> {
        self.item_templates.get(key)
    }

    pub fn recipe(&self, key: &str) -> Result<&Recipe, GameError> {
        self.recipes
            .get(key)
            .ok_or_else(|| GameError::MissingContent(format!("recipe {}", key)))
    }

    pub fn quest(&self, quest_id: &str) -> Result<&QuestDef, GameError> {
        self.quests
            .iter()
            .find(|q| q.quest_id == quest_id)
            .ok_or_else(|| GameError::MissingContent(format!("quest {}", quest_id)))
    }

    /// Items gathered by `skill`, limited to the subarea's resource list when it has one.
    pub fn gatherables(&self, skill: Skill, area: &str, subarea: &str) -> Vec<(&str, &ItemDef)> {
        let resources = self
            .subarea(area, subarea)
            .map(|s| s.resources.as_slice())
            .unwrap_or(&[]);
        let mut found: Vec<(&str, &ItemDef)> = self
            .items
            .iter()
            .filter(|(key, item)| {
                item.kind == skill.name()
                    && (resources.is_empty() || resources.iter().any(|r| r == *key))
            })
            .map(|(key, item)| (key.as_str(), item))
            .collect();
        found.sort_by(|a, b| a.0.cmp(b.0));
        found
    }

    /// Every item of one `type`, in key order.
    pub fn items_of_kind(&self, kind: &str) -> Vec<(&str, &ItemDef)> {
        let mut found: Vec<(&str, &ItemDef)> = self
            .items
            .iter()
            .filter(|(_, item)| item.kind == kind)
            .map(|(key, item)| (key.as_str(), item))
            .collect();
        found.sort_by(|a, b| a.0.cmp(b.0));
        found
    }

    /// Recipes unlocked exactly at `tier` of a collection.
    pub fn collection_unlocks(&self, kind: CollectionKind, tier: u32) -> Vec<String> {
        self.collections
            .get(kind.key())
            .and_then(|tiers| tiers.get(&tier.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builtin_content_parses_and_cross_references() {
        let content = ContentTables::builtin().expect("builtin content");
        assert!(!content.mobs.is_empty());
        for area in content.areas.values() {
            for sub in area.sub_areas.values() {
                for mob in &sub.mobs {
                    assert!(content.mobs.contains_key(mob), "unknown mob {}", mob);
                }
                for res in &sub.resources {
                    assert!(content.items.contains_key(res), "unknown resource {}", res);
                }
            }
        }
        for (floor, _) in &content.dungeon_floors {
            let floor: u32 = floor.parse().expect("numeric floor");
            for mob in content.floor_pool(floor).expect("pool") {
                content.dungeon_mob(mob).expect("dungeon mob");
            }
        }
        for (id, npc) in &content.npcs {
            assert!(content.subarea(&npc.area, &npc.sub_area).is_some(), "npc {} is nowhere", id);
            for node in npc.dialogue.values() {
                for choice in &node.options {
                    if let Some(next) = choice.next.as_deref().filter(|n| *n != "end") {
                        assert!(npc.dialogue.contains_key(next), "npc {} has no node {}", id, next);
                    }
                    if let Some(quest) = &choice.give_quest {
                        content.quest(quest).expect("npc quest");
                    }
                }
            }
        }
        for (key, recipe) in &content.recipes {
            assert!(
                content.items.contains_key(key) || content.item_templates.contains_key(key),
                "recipe {} has no output definition",
                key
            );
            for ingredient in recipe.ingredients.keys() {
                assert!(content.items.contains_key(ingredient), "unknown ingredient {}", ingredient);
            }
        }
    }

    #[test]
    fn behavior_falls_back_to_other() {
        let mob: MobTemplate = serde_json::from_str(
            r#"{"name":"Moth","stats":{"hp":5,"str":1,"def":0,"eva":3,"acc":2},"behavior":"skittish"}"#,
        )
        .expect("parse");
        assert_eq!(mob.behavior, MobBehavior::Other);
        assert_eq!(mob.gold, [0, 0]);
        assert!(mob.special_attacks.is_empty());
    }

    #[test]
    fn missing_files_load_as_empty_tables() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(
            dir.path().join("mobs.json"),
            r#"{"mobs":{"rat":{"name":"Rat","stats":{"hp":4,"str":1,"def":0,"eva":1,"acc":1}}}}"#,
        )
        .expect("write");
        let content = ContentTables::load_dir(dir.path()).expect("load");
        assert_eq!(content.mobs.len(), 1);
        assert!(content.dungeon_floors.is_empty());
        assert!(matches!(content.floor(1), Err(GameError::MissingContent(_))));
    }

    #[test]
    fn malformed_table_is_a_parse_error() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("recipes.json"), "{ not json").expect("write");
        let err = ContentTables::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, GameError::Json(_)));
    }
}
