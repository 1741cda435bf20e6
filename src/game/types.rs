use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const PLAYER_SCHEMA_VERSION: u8 = 1;

pub const DEFAULT_MAX_HP: u32 = 100;
pub const DEFAULT_MAX_STAMINA: u32 = 200;
pub const DEFAULT_MAX_INVENTORY: u32 = 200;
/// Fishing outcome thresholds, in percent of a 1..=100 roll.
pub const DEFAULT_TREASURE_CHANCE: u32 = 1;
pub const DEFAULT_TRASH_CHANCE: u32 = 50;

/// Player ids are the chat platform's numeric user ids.
pub type PlayerId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    Mining,
    Fishing,
    Foraging,
    Farming,
    Scavenging,
    Crafting,
    Combat,
}

impl Skill {
    pub const GATHERING: [Skill; 5] = [
        Skill::Mining,
        Skill::Fishing,
        Skill::Foraging,
        Skill::Farming,
        Skill::Scavenging,
    ];

    pub const ALL: [Skill; 7] = [
        Skill::Mining,
        Skill::Fishing,
        Skill::Foraging,
        Skill::Farming,
        Skill::Scavenging,
        Skill::Crafting,
        Skill::Combat,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Skill::Mining => "mining",
            Skill::Fishing => "fishing",
            Skill::Foraging => "foraging",
            Skill::Farming => "farming",
            Skill::Scavenging => "scavenging",
            Skill::Crafting => "crafting",
            Skill::Combat => "combat",
        }
    }

    /// Tool slot consulted for yield bonuses; crafting and combat have none.
    pub fn tool_slot(self) -> Option<GearSlot> {
        match self {
            Skill::Mining => Some(GearSlot::MiningTool),
            Skill::Fishing => Some(GearSlot::FishingTool),
            Skill::Foraging => Some(GearSlot::ForagingTool),
            Skill::Farming => Some(GearSlot::FarmingTool),
            Skill::Scavenging => Some(GearSlot::ScavengingTool),
            Skill::Crafting | Skill::Combat => None,
        }
    }

    /// Collection a gathering skill feeds; scavenging finds junk and has none.
    pub fn collection(self) -> Option<CollectionKind> {
        match self {
            Skill::Mining => Some(CollectionKind::Ore),
            Skill::Fishing => Some(CollectionKind::Fish),
            Skill::Foraging => Some(CollectionKind::Wood),
            Skill::Farming => Some(CollectionKind::Crop),
            Skill::Scavenging | Skill::Crafting | Skill::Combat => None,
        }
    }

    /// Skill bonus points gained per level. Combat levels raise stats instead.
    pub fn bonus_per_level(self) -> u32 {
        match self {
            Skill::Farming => 5,
            Skill::Combat => 0,
            _ => 2,
        }
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Wood,
    Ore,
    Crop,
    Herb,
    Fish,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 5] = [
        CollectionKind::Wood,
        CollectionKind::Ore,
        CollectionKind::Crop,
        CollectionKind::Herb,
        CollectionKind::Fish,
    ];

    pub fn key(self) -> &'static str {
        match self {
            CollectionKind::Wood => "wood",
            CollectionKind::Ore => "ore",
            CollectionKind::Crop => "crop",
            CollectionKind::Herb => "herb",
            CollectionKind::Fish => "fish",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CrateTier {
    Common,
    Uncommon,
    Rare,
    Legendary,
}

impl CrateTier {
    pub const ALL: [CrateTier; 4] = [
        CrateTier::Common,
        CrateTier::Uncommon,
        CrateTier::Rare,
        CrateTier::Legendary,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CrateTier::Common => "Common",
            CrateTier::Uncommon => "Uncommon",
            CrateTier::Rare => "Rare",
            CrateTier::Legendary => "Legendary",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GearSlot {
    Head,
    Chest,
    Legs,
    Feet,
    Mainhand,
    Offhand,
    Accessory1,
    Accessory2,
    MiningTool,
    FishingTool,
    ForagingTool,
    FarmingTool,
    ScavengingTool,
}

impl GearSlot {
    pub const ARMOR: [GearSlot; 8] = [
        GearSlot::Head,
        GearSlot::Chest,
        GearSlot::Legs,
        GearSlot::Feet,
        GearSlot::Mainhand,
        GearSlot::Offhand,
        GearSlot::Accessory1,
        GearSlot::Accessory2,
    ];

    pub const TOOLS: [GearSlot; 5] = [
        GearSlot::MiningTool,
        GearSlot::FishingTool,
        GearSlot::ForagingTool,
        GearSlot::FarmingTool,
        GearSlot::ScavengingTool,
    ];

    pub fn label(self) -> &'static str {
        match self {
            GearSlot::Head => "Head",
            GearSlot::Chest => "Chest",
            GearSlot::Legs => "Legs",
            GearSlot::Feet => "Feet",
            GearSlot::Mainhand => "Main Hand",
            GearSlot::Offhand => "Off Hand",
            GearSlot::Accessory1 => "Accessory 1",
            GearSlot::Accessory2 => "Accessory 2",
            GearSlot::MiningTool => "Mining Tool",
            GearSlot::FishingTool => "Fishing Tool",
            GearSlot::ForagingTool => "Foraging Tool",
            GearSlot::FarmingTool => "Farming Tool",
            GearSlot::ScavengingTool => "Scavenging Tool",
        }
    }

    /// Parse a slot name as typed by players (`mainhand`, `main_hand`, `miningtool`...).
    pub fn parse(raw: &str) -> Option<GearSlot> {
        let norm: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        GearSlot::ARMOR
            .iter()
            .chain(GearSlot::TOOLS.iter())
            .copied()
            .find(|slot| {
                let label: String = slot
                    .label()
                    .chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .to_ascii_lowercase();
                label == norm
            })
    }
}

impl fmt::Display for GearSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The `general` category: vitals, base attributes, wallet and stamina.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralStats {
    pub name: String,
    #[serde(default)]
    pub bio: String,
    pub hp: u32,
    pub max_hp: u32,
    pub strength: u32,
    pub defense: u32,
    pub evasion: u32,
    pub accuracy: u32,
    pub wallet: u64,
    pub stamina: u32,
    pub max_stamina: u32,
    pub last_stamina_update: DateTime<Utc>,
    pub max_inventory: u32,
    #[serde(default)]
    pub power_rating: u32,
    /// Set while a dungeon run is in progress; cleared on every terminal path.
    #[serde(default)]
    pub in_dungeon: bool,
    #[serde(default)]
    pub essence: BTreeMap<Skill, f64>,
    #[serde(default = "default_treasure_chance")]
    pub treasure_chance: u32,
    #[serde(default = "default_trash_chance")]
    pub trash_chance: u32,
    /// Unopened crates reeled in while fishing.
    #[serde(default)]
    pub crates: BTreeMap<CrateTier, u32>,
}

fn default_treasure_chance() -> u32 {
    DEFAULT_TREASURE_CHANCE
}

fn default_trash_chance() -> u32 {
    DEFAULT_TRASH_CHANCE
}

impl GeneralStats {
    pub fn new(name: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            bio: String::new(),
            hp: DEFAULT_MAX_HP,
            max_hp: DEFAULT_MAX_HP,
            strength: 1,
            defense: 1,
            evasion: 1,
            accuracy: 1,
            wallet: 0,
            stamina: DEFAULT_MAX_STAMINA,
            max_stamina: DEFAULT_MAX_STAMINA,
            last_stamina_update: now,
            max_inventory: DEFAULT_MAX_INVENTORY,
            power_rating: 0,
            in_dungeon: false,
            essence: BTreeMap::new(),
            treasure_chance: DEFAULT_TREASURE_CHANCE,
            trash_chance: DEFAULT_TRASH_CHANCE,
            crates: BTreeMap::new(),
        }
    }

    /// Set HP, clamped to `[0, max_hp]`.
    pub fn set_hp(&mut self, hp: u32) {
        self.hp = hp.min(self.max_hp);
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkillProgress {
    pub level: u32,
    pub xp: u32,
    pub bonus: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkillSet {
    #[serde(default)]
    pub skills: BTreeMap<Skill, SkillProgress>,
}

impl SkillSet {
    pub fn get(&self, skill: Skill) -> SkillProgress {
        self.skills.get(&skill).copied().unwrap_or_default()
    }

    pub fn get_mut(&mut self, skill: Skill) -> &mut SkillProgress {
        self.skills.entry(skill).or_default()
    }

    pub fn level(&self, skill: Skill) -> u32 {
        self.get(skill).level
    }
}

/// Item counters keyed by item id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Inventory {
    #[serde(default)]
    pub items: BTreeMap<String, u32>,
}

impl Inventory {
    pub fn count(&self, item: &str) -> u32 {
        self.items.get(item).copied().unwrap_or(0)
    }

    pub fn total_units(&self) -> u64 {
        self.items.values().map(|q| *q as u64).sum()
    }
}

/// One concrete piece of gear owned by a player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GearInstance {
    pub instance_id: String,
    pub template: String,
    #[serde(default)]
    pub custom_name: Option<String>,
}

impl GearInstance {
    pub fn new(template: &str) -> Self {
        Self {
            instance_id: uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
            template: template.to_string(),
            custom_name: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EquipmentDoc {
    #[serde(default)]
    pub slots: BTreeMap<GearSlot, String>,
    #[serde(default)]
    pub instances: Vec<GearInstance>,
}

impl EquipmentDoc {
    pub fn instance(&self, instance_id: &str) -> Option<&GearInstance> {
        self.instances.iter().find(|i| i.instance_id == instance_id)
    }

    /// The gear instance equipped in `slot`, if any.
    pub fn equipped(&self, slot: GearSlot) -> Option<&GearInstance> {
        self.slots.get(&slot).and_then(|id| self.instance(id))
    }

    pub fn slot_of(&self, instance_id: &str) -> Option<GearSlot> {
        self.slots
            .iter()
            .find(|(_, id)| id.as_str() == instance_id)
            .map(|(slot, _)| *slot)
    }

    pub fn equipped_instances(&self) -> impl Iterator<Item = (GearSlot, &GearInstance)> {
        self.slots
            .iter()
            .filter_map(|(slot, id)| self.instance(id).map(|inst| (*slot, inst)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    pub area: String,
    pub subarea: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionProgress {
    /// Lifetime units gathered.
    pub count: u64,
    pub level: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Collections {
    #[serde(default)]
    pub entries: BTreeMap<CollectionKind, CollectionProgress>,
}

impl Collections {
    pub fn get(&self, kind: CollectionKind) -> CollectionProgress {
        self.entries.get(&kind).copied().unwrap_or_default()
    }

    pub fn get_mut(&mut self, kind: CollectionKind) -> &mut CollectionProgress {
        self.entries.entry(kind).or_default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    Kill,
    Collect,
    Explore,
    Talk,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectiveProgress {
    pub kind: ObjectiveKind,
    pub target: String,
    pub required: u32,
    pub current: u32,
}

impl ObjectiveProgress {
    pub fn is_complete(&self) -> bool {
        self.current >= self.required
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerQuest {
    pub quest_id: String,
    pub accepted_at: DateTime<Utc>,
    pub objectives: Vec<ObjectiveProgress>,
}

impl PlayerQuest {
    pub fn all_objectives_complete(&self) -> bool {
        self.objectives.iter().all(ObjectiveProgress::is_complete)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestLog {
    #[serde(default)]
    pub active: Vec<PlayerQuest>,
    #[serde(default)]
    pub completed: BTreeSet<String>,
}

/// Everything persisted about one player, grouped by category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub general: GeneralStats,
    #[serde(default)]
    pub skills: SkillSet,
    #[serde(default)]
    pub inventory: Inventory,
    #[serde(default)]
    pub equipment: EquipmentDoc,
    pub location: Location,
    #[serde(default)]
    pub collections: Collections,
    #[serde(default)]
    pub recipes: BTreeSet<String>,
    #[serde(default)]
    pub quests: QuestLog,
    pub schema_version: u8,
}

impl PlayerRecord {
    pub fn new(id: PlayerId, name: &str, area: &str, subarea: &str) -> Self {
        let now = Utc::now();
        let mut skills = SkillSet::default();
        for skill in Skill::ALL {
            skills.skills.insert(skill, SkillProgress::default());
        }
        let mut collections = Collections::default();
        for kind in CollectionKind::ALL {
            collections.entries.insert(kind, CollectionProgress::default());
        }
        let mut recipes = BTreeSet::new();
        recipes.insert("tool_rod".to_string());
        Self {
            id,
            created_at: now,
            updated_at: now,
            general: GeneralStats::new(name, now),
            skills,
            inventory: Inventory::default(),
            equipment: EquipmentDoc::default(),
            location: Location {
                area: area.to_string(),
                subarea: subarea.to_string(),
            },
            collections,
            recipes,
            quests: QuestLog::default(),
            schema_version: PLAYER_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_player_has_registration_defaults() {
        let player = PlayerRecord::new(7, "Aria", "plains", "pond");
        assert_eq!(player.general.hp, 100);
        assert_eq!(player.general.max_hp, 100);
        assert_eq!(player.general.stamina, 200);
        assert_eq!(player.general.strength, 1);
        assert_eq!(player.skills.level(Skill::Combat), 0);
        assert!(player.recipes.contains("tool_rod"));
        assert_eq!(player.location.subarea, "pond");
    }

    #[test]
    fn hp_setter_clamps_to_max() {
        let mut general = GeneralStats::new("x", Utc::now());
        general.set_hp(500);
        assert_eq!(general.hp, general.max_hp);
    }

    #[test]
    fn slot_parsing_ignores_case_and_separators() {
        assert_eq!(GearSlot::parse("mainhand"), Some(GearSlot::Mainhand));
        assert_eq!(GearSlot::parse("Main_Hand"), Some(GearSlot::Mainhand));
        assert_eq!(GearSlot::parse("mining-tool"), Some(GearSlot::MiningTool));
        assert_eq!(GearSlot::parse("accessory2"), Some(GearSlot::Accessory2));
        assert_eq!(GearSlot::parse("tail"), None);
    }

    #[test]
    fn gear_instances_get_short_unique_ids() {
        let a = GearInstance::new("iron_sword");
        let b = GearInstance::new("iron_sword");
        assert_eq!(a.instance_id.len(), 8);
        assert_ne!(a.instance_id, b.instance_id);
    }
}
