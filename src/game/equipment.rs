//! Gear slots, equip/unequip bookkeeping and the stat derivation that turns a
//! player record into a `CombatantStats` block.

use std::collections::HashMap;

use crate::game::combat::CombatantStats;
use crate::game::content::{ContentTables, GearStats};
use crate::game::errors::GameError;
use crate::game::types::{GearInstance, GearSlot, PlayerRecord, Skill};

/// Add a freshly minted instance of `template` to the player's gear. Returns its id.
pub fn grant_gear(player: &mut PlayerRecord, template: &str) -> String {
    let instance = GearInstance::new(template);
    let id = instance.instance_id.clone();
    player.equipment.instances.push(instance);
    id
}

/// Equip an owned gear instance.
///
/// With no explicit slot, the single empty allowed slot is chosen; ambiguity is an error
/// that lists the candidates.
pub fn equip(
    player: &mut PlayerRecord,
    instance_id: &str,
    slot: Option<GearSlot>,
    content: &ContentTables,
) -> Result<GearSlot, GameError> {
    let instance = player
        .equipment
        .instance(instance_id)
        .ok_or_else(|| GameError::NotFound(instance_id.to_string()))?;
    if let Some(current) = player.equipment.slot_of(instance_id) {
        return Err(GameError::Precondition(format!(
            "That item is already equipped in {}.",
            current
        )));
    }
    let template = content
        .template(&instance.template)
        .ok_or_else(|| GameError::MissingContent(format!("item template {}", instance.template)))?;
    if template.equip_slots.is_empty() {
        return Err(GameError::Precondition(format!(
            "{} cannot be equipped.",
            template.name
        )));
    }

    let occupied = |s: &GearSlot| player.equipment.slots.contains_key(s);
    let chosen = match slot {
        Some(wanted) => {
            if !template.equip_slots.contains(&wanted) {
                return Err(GameError::Precondition(format!(
                    "{} does not fit in {}.",
                    template.name, wanted
                )));
            }
            if occupied(&wanted) {
                return Err(GameError::Precondition(format!(
                    "{} is occupied; unequip it first.",
                    wanted
                )));
            }
            wanted
        }
        None => {
            let empty: Vec<GearSlot> = template
                .equip_slots
                .iter()
                .copied()
                .filter(|s| !occupied(s))
                .collect();
            match empty.as_slice() {
                [only] => *only,
                [] => {
                    return Err(GameError::Precondition(format!(
                        "Every slot for {} is occupied.",
                        template.name
                    )))
                }
                several => {
                    let names: Vec<String> =
                        several.iter().map(|s| s.label().to_string()).collect();
                    return Err(GameError::Precondition(format!(
                        "Choose a slot: {}.",
                        names.join(", ")
                    )));
                }
            }
        }
    };
    player
        .equipment
        .slots
        .insert(chosen, instance_id.to_string());
    Ok(chosen)
}

/// Unequip by slot name or by instance id. Returns the freed slot and instance id.
pub fn unequip(player: &mut PlayerRecord, target: &str) -> Result<(GearSlot, String), GameError> {
    let slot = match GearSlot::parse(target) {
        Some(slot) => slot,
        None => player.equipment.slot_of(target).ok_or_else(|| {
            GameError::Precondition(format!("Nothing equipped matches '{}'.", target))
        })?,
    };
    let instance_id = player
        .equipment
        .slots
        .remove(&slot)
        .ok_or_else(|| GameError::Precondition(format!("{} is empty.", slot)))?;
    Ok((slot, instance_id))
}

/// Summed stats of equipped armor, weapons and accessories, set bonuses included.
pub fn gear_totals(player: &PlayerRecord, content: &ContentTables) -> GearStats {
    let mut totals = GearStats::default();
    let mut set_counts: HashMap<&str, u32> = HashMap::new();
    for slot in GearSlot::ARMOR {
        let Some(template) = player
            .equipment
            .equipped(slot)
            .and_then(|inst| content.template(&inst.template))
        else {
            continue;
        };
        totals += &template.stats;
        if let Some(set) = template.set.as_deref() {
            *set_counts.entry(set).or_insert(0) += 1;
        }
    }
    for (set, pieces) in set_counts {
        let Some(def) = content.sets.get(set) else {
            continue;
        };
        for bonus in def.bonuses.iter().filter(|b| b.pieces <= pieces) {
            totals += &bonus.stats;
        }
    }
    totals
}

/// Active set bonuses as `(set name, equipped pieces)`.
pub fn active_sets(player: &PlayerRecord, content: &ContentTables) -> Vec<(String, u32)> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for (_, inst) in player.equipment.equipped_instances() {
        if let Some(set) = content.template(&inst.template).and_then(|t| t.set.clone()) {
            *counts.entry(set).or_insert(0) += 1;
        }
    }
    let mut out: Vec<(String, u32)> = counts
        .into_iter()
        .filter_map(|(set, n)| {
            let def = content.sets.get(&set)?;
            def.bonuses
                .iter()
                .any(|b| b.pieces <= n)
                .then(|| (def.name.clone(), n))
        })
        .collect();
    out.sort();
    out
}

/// Stats of the tool equipped for a gathering skill.
pub fn tool_stats(player: &PlayerRecord, skill: Skill, content: &ContentTables) -> Option<GearStats> {
    let slot = skill.tool_slot()?;
    let inst = player.equipment.equipped(slot)?;
    content.template(&inst.template).map(|t| t.stats)
}

/// Build the player's combatant block from base stats, skill levels and gear.
pub fn derive_combatant(player: &PlayerRecord, content: &ContentTables) -> CombatantStats {
    let gear = gear_totals(player, content);
    let general = &player.general;
    let combat = player.skills.level(Skill::Combat);
    let max_hp = general.max_hp + gear.hp;
    let crit_chance = player
        .equipment
        .equipped(GearSlot::Mainhand)
        .and_then(|inst| content.template(&inst.template))
        .map(|t| t.stats.crit_chance.clamp(0.0, 1.0))
        .unwrap_or(0.0);
    CombatantStats {
        current_hp: general.hp.min(max_hp),
        max_hp,
        strength: general.strength + combat * 2 + gear.strength,
        defense: general.defense + player.skills.level(Skill::Mining) + gear.defense,
        evasion: general.evasion + player.skills.level(Skill::Foraging) + gear.evasion,
        accuracy: general.accuracy + combat * 2 + gear.accuracy,
        crit_chance,
        skill_bonus: gear.skill_bonus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (PlayerRecord, ContentTables) {
        let content = ContentTables::builtin().expect("content");
        (PlayerRecord::new(1, "Aria", "plains", "pond"), content)
    }

    #[test]
    fn single_slot_items_auto_equip() {
        let (mut player, content) = setup();
        let id = grant_gear(&mut player, "wooden_sword");
        assert_eq!(equip(&mut player, &id, None, &content).expect("equip"), GearSlot::Mainhand);
        let err = equip(&mut player, &id, None, &content).unwrap_err();
        assert!(err.to_string().contains("already equipped"));
    }

    #[test]
    fn two_free_accessory_slots_need_a_choice() {
        let (mut player, content) = setup();
        let first = grant_gear(&mut player, "copper_ring");
        let second = grant_gear(&mut player, "copper_ring");
        let err = equip(&mut player, &first, None, &content).unwrap_err();
        assert!(err.to_string().contains("Accessory 1"));
        assert!(err.to_string().contains("Accessory 2"));
        equip(&mut player, &first, Some(GearSlot::Accessory2), &content).expect("explicit");
        assert_eq!(
            equip(&mut player, &second, None, &content).expect("auto"),
            GearSlot::Accessory1
        );
        let third = grant_gear(&mut player, "copper_ring");
        assert!(equip(&mut player, &third, None, &content).is_err());
    }

    #[test]
    fn explicit_slot_must_be_allowed() {
        let (mut player, content) = setup();
        let id = grant_gear(&mut player, "wooden_sword");
        assert!(equip(&mut player, &id, Some(GearSlot::Head), &content).is_err());
        assert!(player.equipment.slots.is_empty());
    }

    #[test]
    fn unequip_by_slot_or_instance() {
        let (mut player, content) = setup();
        let id = grant_gear(&mut player, "wooden_shield");
        equip(&mut player, &id, None, &content).expect("equip");
        let (slot, freed) = unequip(&mut player, &id).expect("by id");
        assert_eq!((slot, freed.as_str()), (GearSlot::Offhand, id.as_str()));
        equip(&mut player, &id, None, &content).expect("re-equip");
        unequip(&mut player, "offhand").expect("by slot");
        assert!(unequip(&mut player, "offhand").is_err());
    }

    #[test]
    fn derived_stats_include_levels_gear_and_sets() {
        let (mut player, content) = setup();
        player.skills.get_mut(Skill::Combat).level = 2;
        player.skills.get_mut(Skill::Mining).level = 3;
        player.skills.get_mut(Skill::Foraging).level = 1;
        for template in ["iron_sword", "leather_cap", "leather_vest", "leather_boots"] {
            let id = grant_gear(&mut player, template);
            equip(&mut player, &id, None, &content).expect("equip");
        }
        let gear = gear_totals(&player, &content);
        let stats = derive_combatant(&player, &content);
        assert_eq!(stats.strength, 1 + 4 + gear.strength);
        assert_eq!(stats.defense, 1 + 3 + gear.defense);
        assert_eq!(stats.evasion, 1 + 1 + gear.evasion);
        assert_eq!(stats.accuracy, 1 + 4 + gear.accuracy);
        assert_eq!(stats.max_hp, 100 + gear.hp);
        assert!(stats.crit_chance > 0.0);
        assert_eq!(active_sets(&player, &content), vec![("Leather Set".to_string(), 3)]);

        let set = &content.sets["leather"];
        let mut without_set = GearStats::default();
        for template in ["iron_sword", "leather_cap", "leather_vest", "leather_boots"] {
            without_set += &content.item_templates[template].stats;
        }
        let set_hp: u32 = set.bonuses.iter().map(|b| b.stats.hp).sum();
        assert_eq!(gear.hp, without_set.hp + set_hp);
    }

    #[test]
    fn unarmed_player_has_no_crit() {
        let (player, content) = setup();
        let stats = derive_combatant(&player, &content);
        assert_eq!(stats.crit_chance, 0.0);
        assert_eq!(stats.strength, 1);
        assert_eq!(stats.current_hp, 100);
    }
}
