//! The five gathering skills: mining, fishing, foraging, farming, scavenging.

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::game::content::{ContentTables, ItemDef};
use crate::game::dice::Dice;
use crate::game::equipment::tool_stats;
use crate::game::errors::GameError;
use crate::game::inventory::{add_items, space_left};
use crate::game::progression::{advance_collection, award_player_xp, regenerate_stamina, XpAward};
use crate::game::quest::record_progress;
use crate::game::types::{CollectionKind, CrateTier, ObjectiveKind, PlayerRecord, Skill};
use crate::game::GameRules;

/// Skills that refuse to work without their tool equipped.
fn requires_tool(skill: Skill) -> bool {
    matches!(skill, Skill::Farming | Skill::Scavenging)
}

fn verb(skill: Skill) -> &'static str {
    match skill {
        Skill::Mining => "mine",
        Skill::Fishing => "fish",
        Skill::Foraging => "forage",
        Skill::Farming => "farm",
        Skill::Scavenging => "scavenge",
        Skill::Crafting => "craft",
        Skill::Combat => "fight",
    }
}

/// What one gathering action brought up. Only fishing rolls anything but `Resource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catch {
    Resource,
    Trash,
    Coins(u64),
    Crate(CrateTier),
}

/// Item type of the junk fishing can pull up.
pub const TRASH_KIND: &str = "trash";

#[derive(Debug, Clone, PartialEq)]
pub struct GatherReport {
    pub skill: Skill,
    pub catch: Catch,
    /// Empty for coin and crate catches.
    pub item: String,
    pub item_name: String,
    pub qty: u32,
    pub bonus_roll: bool,
    pub xp_gained: u32,
    pub xp: XpAward,
    pub essence: f64,
    pub collection: Option<(CollectionKind, Vec<u32>)>,
    pub unlocked: Vec<String>,
    pub quests_ready: Vec<String>,
    pub stamina: u32,
}

/// Turn a base quantity into the final yield.
///
/// `base * yield * (1 + bonus * 0.02)`, the fractional part kept with matching
/// probability, plus one extra unit with chance `extra + bonus * 0.005`.
pub fn final_quantity(
    base: u32,
    yield_multiplier: f64,
    extra_roll_chance: f64,
    skill_bonus: u32,
    dice: &mut impl Dice,
) -> (u32, bool) {
    let exact = base as f64 * yield_multiplier * (1.0 + skill_bonus as f64 * 0.02);
    let whole = exact.floor();
    let mut qty = whole.max(0.0) as u32;
    if dice.roll() < exact - whole {
        qty += 1;
    }
    let extra = dice.roll() < extra_roll_chance + skill_bonus as f64 * 0.005;
    if extra {
        qty += 1;
    }
    (qty, extra)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn gather(
    player: &mut PlayerRecord,
    skill: Skill,
    content: &ContentTables,
    rules: &GameRules,
    now: DateTime<Utc>,
    dice: &mut impl Dice,
) -> Result<GatherReport, GameError> {
    if !Skill::GATHERING.contains(&skill) {
        return Err(GameError::Precondition(format!("{} is not a gathering skill.", skill)));
    }
    regenerate_stamina(&mut player.general, now, rules.stamina_regen_secs);
    if player.general.stamina == 0 {
        return Err(GameError::NoStamina);
    }
    let tool = tool_stats(player, skill, content);
    if tool.is_none() && requires_tool(skill) {
        let slot = skill.tool_slot().map(|s| s.label()).unwrap_or("tool");
        return Err(GameError::Precondition(format!(
            "You must equip a {} first.",
            slot.to_ascii_lowercase()
        )));
    }
    let room = space_left(player);
    if room == 0 {
        return Err(GameError::Precondition("Your inventory is full.".to_string()));
    }

    let candidates = content.gatherables(skill, &player.location.area, &player.location.subarea);
    let weights: Vec<u32> = candidates.iter().map(|(_, item)| item.weight).collect();
    let nothing_here =
        || GameError::Precondition(format!("There is nothing to {} here.", verb(skill)));
    if weights.iter().all(|w| *w == 0) {
        return Err(nothing_here());
    }
    if skill == Skill::Fishing {
        if let Some(report) = cast_line(player, content, room, dice) {
            return Ok(report);
        }
    }
    let idx = dice.pick_weighted(&weights).ok_or_else(nothing_here)?;
    let (key, item) = candidates[idx];

    let base = if skill == Skill::Fishing {
        dice.between(1, 2)
    } else {
        dice.between(1, 3)
    };
    let bonus = player.skills.get(skill).bonus;
    let (yield_multiplier, extra_chance) = tool
        .map(|t| (t.yield_multiplier.unwrap_or(1.0), t.extra_roll_chance.unwrap_or(0.0)))
        .unwrap_or((1.0, 0.0));
    let (rolled, bonus_roll) = final_quantity(base, yield_multiplier, extra_chance, bonus, dice);
    let qty = (rolled as u64).min(room) as u32;
    debug!(
        "player {} {} base {} -> {} (yield {:.2}, bonus {})",
        player.id, verb(skill), base, qty, yield_multiplier, bonus
    );
    Ok(store_haul(
        player,
        skill,
        Haul { catch: Catch::Resource, key, item, qty, bonus_roll },
        content,
    ))
}

/// Roll the fishing outcome on 1..=100: treasure up to `treasure_chance`,
/// junk up to `trash_chance`, otherwise `None` and a normal catch.
fn cast_line(
    player: &mut PlayerRecord,
    content: &ContentTables,
    room: u64,
    dice: &mut impl Dice,
) -> Option<GatherReport> {
    let roll = dice.between(1, 100);
    if roll <= player.general.treasure_chance {
        return Some(reel_treasure(player, dice));
    }
    if roll > player.general.trash_chance {
        return None;
    }
    let trash = content.items_of_kind(TRASH_KIND);
    let weights: Vec<u32> = trash.iter().map(|(_, item)| item.weight).collect();
    let (key, item) = trash[dice.pick_weighted(&weights)?];
    let qty = (dice.between(1, 2) as u64).min(room) as u32;
    Some(store_haul(
        player,
        Skill::Fishing,
        Haul { catch: Catch::Trash, key, item, qty, bonus_roll: false },
        content,
    ))
}

/// Coins (10-500, 3 XP) or a crate of random tier (4 XP), even odds.
fn reel_treasure(player: &mut PlayerRecord, dice: &mut impl Dice) -> GatherReport {
    let (catch, xp_gained) = if dice.roll() < 0.5 {
        let coins = dice.between(10, 500) as u64;
        player.general.wallet += coins;
        (Catch::Coins(coins), 3)
    } else {
        let tier = CrateTier::ALL[dice.pick(CrateTier::ALL.len())];
        *player.general.crates.entry(tier).or_insert(0) += 1;
        (Catch::Crate(tier), 4)
    };
    info!("player {} fished up treasure: {:?}", player.id, catch);
    player.general.stamina -= 1;
    let xp = award_player_xp(player, Skill::Fishing, xp_gained);
    let essence = round2(xp_gained as f64 * 0.35);
    *player.general.essence.entry(Skill::Fishing).or_insert(0.0) += essence;
    GatherReport {
        skill: Skill::Fishing,
        catch,
        item: String::new(),
        item_name: String::new(),
        qty: 0,
        bonus_roll: false,
        xp_gained,
        xp,
        essence,
        collection: None,
        unlocked: Vec::new(),
        quests_ready: Vec::new(),
        stamina: player.general.stamina,
    }
}

struct Haul<'a> {
    catch: Catch,
    key: &'a str,
    item: &'a ItemDef,
    qty: u32,
    bonus_roll: bool,
}

/// Bank an item haul: inventory, stamina, XP, essence, collection tiers and quest progress.
fn store_haul(
    player: &mut PlayerRecord,
    skill: Skill,
    haul: Haul<'_>,
    content: &ContentTables,
) -> GatherReport {
    let Haul { catch, key, item, qty, bonus_roll } = haul;
    add_items(&mut player.inventory, key, qty);
    player.general.stamina -= 1;
    let xp_gained = item.xp * qty;
    let xp = award_player_xp(player, skill, xp_gained);
    let essence = round2(xp_gained as f64 * 0.35);
    *player.general.essence.entry(skill).or_insert(0.0) += essence;

    let mut unlocked = Vec::new();
    let collection = item.collection.or(skill.collection()).map(|kind| {
        let tiers = advance_collection(player.collections.get_mut(kind), qty);
        for tier in &tiers {
            for recipe in content.collection_unlocks(kind, *tier) {
                if player.recipes.insert(recipe.clone()) {
                    unlocked.push(recipe);
                }
            }
            info!("player {} reached {} collection tier {}", player.id, kind.key(), tier);
        }
        (kind, tiers)
    });
    let quests_ready = record_progress(player, ObjectiveKind::Collect, key, qty);

    GatherReport {
        skill,
        catch,
        item: key.to_string(),
        item_name: item.name.clone(),
        qty,
        bonus_roll,
        xp_gained,
        xp,
        essence,
        collection,
        unlocked,
        quests_ready,
        stamina: player.general.stamina,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::dice::ScriptedDice;
    use crate::game::equipment::{equip, grant_gear};

    fn setup() -> (PlayerRecord, ContentTables) {
        (
            PlayerRecord::new(31, "Aria", "hills", "quarry"),
            ContentTables::builtin().expect("content"),
        )
    }

    #[test]
    fn tool_and_bonus_scale_quantity() {
        let mut dice = ScriptedDice::new([0.99, 0.99]);
        assert_eq!(final_quantity(2, 1.0, 0.0, 0, &mut dice), (2, false));
        // 2 * 1.5 * 1.1 = 3.3; fraction kept on 0.2, extra roll 0.05 + 0.025 hits on 0.01
        let mut dice = ScriptedDice::new([0.2, 0.01]);
        assert_eq!(final_quantity(2, 1.5, 0.05, 5, &mut dice), (5, true));
    }

    #[test]
    fn mining_updates_inventory_xp_essence_and_collection() {
        let (mut player, content) = setup();
        let mut dice = ScriptedDice::constant(0.0);
        let report = gather(&mut player, Skill::Mining, &content, &GameRules::default(), Utc::now(), &mut dice)
            .expect("mine");
        assert_eq!(report.qty, 1);
        assert_eq!(player.inventory.count(&report.item), 1);
        assert_eq!(player.general.stamina, 199);
        let item = content.item(&report.item).expect("item");
        assert_eq!(report.xp_gained, item.xp);
        assert_eq!(report.essence, round2(item.xp as f64 * 0.35));
        assert_eq!(player.collections.get(CollectionKind::Ore).count, 1);
    }

    #[test]
    fn collection_tier_unlocks_recipes() {
        let (mut player, content) = setup();
        player.collections.get_mut(CollectionKind::Ore).count = 49;
        let mut dice = ScriptedDice::constant(0.0);
        let report = gather(&mut player, Skill::Mining, &content, &GameRules::default(), Utc::now(), &mut dice)
            .expect("mine");
        assert_eq!(report.collection, Some((CollectionKind::Ore, vec![1])));
        for recipe in content.collection_unlocks(CollectionKind::Ore, 1) {
            assert!(player.recipes.contains(&recipe));
            assert!(report.unlocked.contains(&recipe));
        }
    }

    fn cast(player: &mut PlayerRecord, content: &ContentTables, rolls: &[f64]) -> GatherReport {
        let mut dice = ScriptedDice::new(rolls.iter().copied());
        gather(player, Skill::Fishing, content, &GameRules::default(), Utc::now(), &mut dice)
            .expect("fish")
    }

    #[test]
    fn fishing_can_reel_in_coins_or_crates() {
        let content = ContentTables::builtin().expect("content");
        let mut player = PlayerRecord::new(32, "Aria", "plains", "pond");

        let report = cast(&mut player, &content, &[0.0, 0.0, 0.999]);
        assert_eq!(report.catch, Catch::Coins(500));
        assert_eq!(player.general.wallet, 500);
        assert_eq!((report.qty, report.xp_gained), (0, 3));
        assert_eq!(player.inventory.total_units(), 0);

        let report = cast(&mut player, &content, &[0.0, 0.7, 0.999]);
        assert_eq!(report.catch, Catch::Crate(CrateTier::Legendary));
        assert_eq!(report.xp_gained, 4);
        assert_eq!(player.general.crates.get(&CrateTier::Legendary), Some(&1));
        assert_eq!(player.skills.get(Skill::Fishing).xp, 7);
        assert_eq!(player.general.stamina, 198);
        assert_eq!(player.collections.get(CollectionKind::Fish).count, 0);
    }

    #[test]
    fn fishing_junk_and_fish_fill_the_bag() {
        let content = ContentTables::builtin().expect("content");
        let mut player = PlayerRecord::new(33, "Aria", "plains", "pond");
        let (junk, junk_def) = content.items_of_kind(TRASH_KIND)[0];

        // 31 is past treasure (1) and within trash (50)
        let report = cast(&mut player, &content, &[0.3, 0.0, 0.999]);
        assert_eq!(report.catch, Catch::Trash);
        assert_eq!((report.item.as_str(), report.qty), (junk, 2));
        assert_eq!(report.xp_gained, junk_def.xp * 2);
        assert_eq!(player.inventory.count(junk), 2);

        let report = cast(&mut player, &content, &[0.9, 0.0, 0.999]);
        assert_eq!(report.catch, Catch::Resource);
        assert_eq!((report.item.as_str(), report.qty), ("minnow", 2));
        assert_eq!(player.collections.get(CollectionKind::Fish).count, 4);

        // without the trash band every non-treasure cast is a fish
        player.general.trash_chance = 0;
        let report = cast(&mut player, &content, &[0.3, 0.0, 0.0]);
        assert_eq!(report.catch, Catch::Resource);
        assert_eq!(report.qty, 1);
    }

    #[test]
    fn farming_needs_a_tool() {
        let (mut player, content) = setup();
        player.location.area = "plains".into();
        player.location.subarea = "meadow".into();
        let mut dice = ScriptedDice::constant(0.0);
        let rules = GameRules::default();
        let err = gather(&mut player, Skill::Farming, &content, &rules, Utc::now(), &mut dice)
            .unwrap_err();
        assert!(err.to_string().contains("farming tool"));
        let hoe = grant_gear(&mut player, "basic_hoe");
        equip(&mut player, &hoe, None, &content).expect("equip");
        gather(&mut player, Skill::Farming, &content, &rules, Utc::now(), &mut dice).expect("farm");
    }

    #[test]
    fn empty_stamina_and_wrong_place_are_rejected() {
        let (mut player, content) = setup();
        let rules = GameRules::default();
        let now = Utc::now();
        let mut dice = ScriptedDice::constant(0.0);
        assert!(gather(&mut player, Skill::Fishing, &content, &rules, now, &mut dice).is_err());
        player.general.stamina = 0;
        player.general.last_stamina_update = now;
        assert!(matches!(
            gather(&mut player, Skill::Mining, &content, &rules, now, &mut dice),
            Err(GameError::NoStamina)
        ));
        assert!(gather(&mut player, Skill::Combat, &content, &rules, now, &mut dice).is_err());
    }
}
