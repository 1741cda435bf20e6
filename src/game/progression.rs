//! XP thresholds, collection tiers, stamina regeneration and power rating.

use chrono::{DateTime, Utc};
use log::info;

use crate::game::errors::GameError;
use crate::game::types::{CollectionProgress, GeneralStats, PlayerRecord, Skill};

/// XP needed to advance from `level` to `level + 1`.
pub fn xp_threshold(level: u32) -> u32 {
    50 * level + 10
}

/// Lifetime units needed for a collection to move past `level`.
pub fn collection_threshold(level: u32) -> u64 {
    50 * level as u64 + 50
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpAward {
    pub xp: u32,
    pub level: u32,
    pub leveled_up: bool,
    pub levels_gained: u32,
}

/// Add `gain` XP and roll over as many levels as it pays for.
///
/// The returned `xp` is always below `xp_threshold(level)`.
pub fn award_skill_xp(current_xp: u32, current_level: u32, gain: u32) -> XpAward {
    let mut xp = current_xp.saturating_add(gain);
    let mut level = current_level;
    let mut levels_gained = 0;
    while xp >= xp_threshold(level) {
        xp -= xp_threshold(level);
        level += 1;
        levels_gained += 1;
    }
    XpAward {
        xp,
        level,
        leveled_up: levels_gained > 0,
        levels_gained,
    }
}

/// Per combat level gained: +5 max HP, +2 strength.
pub fn apply_combat_levels(general: &mut GeneralStats, levels: u32) {
    general.max_hp += 5 * levels;
    general.strength += 2 * levels;
}

/// `str + def + eva + acc + max(0, maxHP - 100) / 5`
pub fn power_rating(general: &GeneralStats) -> u32 {
    general.strength
        + general.defense
        + general.evasion
        + general.accuracy
        + general.max_hp.saturating_sub(100) / 5
}

/// Award XP in `skill` to a player and apply the level-up side effects.
///
/// Combat levels raise max HP and strength; every other skill gains
/// `Skill::bonus_per_level` bonus points per level.
pub fn award_player_xp(player: &mut PlayerRecord, skill: Skill, gain: u32) -> XpAward {
    let progress = player.skills.get_mut(skill);
    let award = award_skill_xp(progress.xp, progress.level, gain);
    progress.xp = award.xp;
    progress.level = award.level;
    if award.leveled_up {
        if skill == Skill::Combat {
            apply_combat_levels(&mut player.general, award.levels_gained);
        } else {
            progress.bonus += skill.bonus_per_level() * award.levels_gained;
        }
        info!(
            "player {} reached {} level {}",
            player.id, skill, award.level
        );
    }
    player.general.power_rating = power_rating(&player.general);
    award
}

/// Add gathered units to a collection; returns the tiers newly reached.
pub fn advance_collection(progress: &mut CollectionProgress, qty: u32) -> Vec<u32> {
    progress.count += qty as u64;
    let mut reached = Vec::new();
    while progress.count >= collection_threshold(progress.level) {
        progress.level += 1;
        reached.push(progress.level);
    }
    reached
}

/// Grant one stamina point per full `regen_secs` since the last update.
///
/// The timer resets whenever stamina is granted or the pool is already full.
/// Returns the stamina gained.
pub fn regenerate_stamina(general: &mut GeneralStats, now: DateTime<Utc>, regen_secs: u64) -> u32 {
    if general.stamina >= general.max_stamina {
        general.last_stamina_update = now;
        return 0;
    }
    let elapsed = (now - general.last_stamina_update).num_seconds().max(0) as u64;
    let ticks = elapsed / regen_secs.max(1);
    if ticks == 0 {
        return 0;
    }
    let room = general.max_stamina - general.stamina;
    let gained = ticks.min(room as u64) as u32;
    general.stamina += gained;
    general.last_stamina_update = now;
    gained
}

/// Spend stamina to heal up to `target_hp`, two HP per stamina point (rounded up).
/// Returns the stamina spent.
pub fn rest(general: &mut GeneralStats, target_hp: u32) -> Result<u32, GameError> {
    if target_hp <= general.hp {
        return Err(GameError::Precondition(format!(
            "You're already at {} HP or more!",
            general.hp
        )));
    }
    if target_hp > general.max_hp {
        return Err(GameError::Precondition(format!(
            "You can't heal past your max HP of {}.",
            general.max_hp
        )));
    }
    let cost = (target_hp - general.hp + 1) / 2;
    if general.stamina < cost {
        return Err(GameError::Precondition(format!(
            "You need {} stamina to heal to {} HP, but you only have {}.",
            cost, target_hp, general.stamina
        )));
    }
    general.stamina -= cost;
    general.set_hp(target_hp);
    Ok(cost)
}
