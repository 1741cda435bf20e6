//! Open-world hunts: one mob from the player's current subarea, fought round by
//! round (or auto-resolved), then settled onto the player record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::game::combat::{
    defeat_penalty, resolve_round, roll_victory_rewards, scaled_xp, CombatEvent, CombatRules,
    CombatState, HitRule, MobInstance, Outcome, PlayerAction,
};
use crate::game::content::{ContentTables, MobTemplate};
use crate::game::dice::Dice;
use crate::game::equipment::derive_combatant;
use crate::game::errors::GameError;
use crate::game::inventory::apply_loot;
use crate::game::progression::{award_player_xp, regenerate_stamina, XpAward};
use crate::game::quest::record_progress;
use crate::game::types::{ObjectiveKind, PlayerId, PlayerRecord, Skill};
use crate::game::GameRules;

#[derive(Debug, Clone, PartialEq)]
pub struct Hunt {
    pub player_id: PlayerId,
    pub mob_id: String,
    pub combat: CombatState,
    pub log: Vec<String>,
}

impl Hunt {
    pub fn is_over(&self) -> bool {
        self.combat.is_over()
    }

    pub fn mob(&self) -> &MobInstance {
        &self.combat.mobs[0]
    }
}

/// Pick a mob whose power is within `padding` of the player's, falling back to any mob.
pub fn select_mob<'a>(
    candidates: &[(&'a str, &'a MobTemplate)],
    player_power: u32,
    padding: u32,
    dice: &mut impl Dice,
) -> Option<(&'a str, &'a MobTemplate)> {
    if candidates.is_empty() {
        return None;
    }
    let low = player_power.saturating_sub(padding);
    let high = player_power + padding;
    let eligible: Vec<(&str, &MobTemplate)> = candidates
        .iter()
        .copied()
        .filter(|(_, mob)| (low..=high).contains(&mob.stats.power()))
        .collect();
    if eligible.is_empty() {
        Some(candidates[dice.pick(candidates.len())])
    } else {
        Some(eligible[dice.pick(eligible.len())])
    }
}

/// Check hunt preconditions and spawn a mob for the player's location.
pub fn start_hunt(
    player: &mut PlayerRecord,
    content: &ContentTables,
    rules: &GameRules,
    now: DateTime<Utc>,
    dice: &mut impl Dice,
) -> Result<Hunt, GameError> {
    if player.general.in_dungeon {
        return Err(GameError::AlreadyInEncounter);
    }
    regenerate_stamina(&mut player.general, now, rules.stamina_regen_secs);
    if player.general.stamina == 0 {
        return Err(GameError::NoStamina);
    }
    if player.general.hp == 0 {
        return Err(GameError::Precondition(
            "You're too injured to hunt. Rest first.".to_string(),
        ));
    }
    let candidates = content.area_mobs(&player.location.area, &player.location.subarea);
    let stats = derive_combatant(player, content);
    let power = stats.strength + stats.defense + stats.evasion + stats.accuracy;
    let (mob_id, template) = select_mob(&candidates, power, rules.hunt_power_padding, dice)
        .ok_or_else(|| {
            GameError::MissingContent(format!(
                "no creatures roam {}/{}",
                player.location.area, player.location.subarea
            ))
        })?;
    info!(
        "player {} hunts {} in {}/{}",
        player.id, mob_id, player.location.area, player.location.subarea
    );
    let combat = CombatState::new(
        stats,
        vec![MobInstance::spawn(mob_id, template)],
        CombatRules {
            hit_rule: HitRule::AccuracyVsEvasion,
            flee_chance: rules.flee_chance,
            focus_enabled: false,
        },
    );
    Ok(Hunt {
        player_id: player.id,
        mob_id: mob_id.to_string(),
        combat,
        log: vec![format!("A wild {} appears!", template.name)],
    })
}

/// Resolve one interactive round.
pub fn play_round(mut hunt: Hunt, action: PlayerAction, dice: &mut impl Dice) -> (Hunt, Vec<CombatEvent>) {
    let (combat, events) = resolve_round(hunt.combat, action, dice);
    hunt.combat = combat;
    for event in &events {
        debug!("hunt {}: {}", hunt.player_id, event);
        hunt.log.push(event.to_string());
    }
    (hunt, events)
}

/// Attack every round until the fight ends. Hitting `round_limit` counts as fleeing.
pub fn auto_resolve(mut hunt: Hunt, round_limit: u32, dice: &mut impl Dice) -> Hunt {
    while !hunt.is_over() {
        if hunt.combat.round >= round_limit {
            hunt.combat.outcome = Some(Outcome::Fled);
            hunt.log.push("The fight drags on and you slip away.".to_string());
            break;
        }
        hunt = play_round(hunt, PlayerAction::Attack, dice).0;
    }
    hunt
}

/// What a finished hunt did to the player.
#[derive(Debug, Clone, PartialEq)]
pub struct HuntSummary {
    pub outcome: Outcome,
    pub mob_name: String,
    pub xp_gained: u32,
    pub xp: Option<XpAward>,
    pub gold_gained: u64,
    pub gold_lost: u64,
    pub stamina_lost: u32,
    pub loot: BTreeMap<String, u32>,
    pub quests_ready: Vec<String>,
    pub hp: u32,
    pub max_hp: u32,
}

/// Apply the result of a finished (or abandoned) hunt to the player record.
///
/// An unfinished hunt is settled as a flee.
pub fn settle_hunt(player: &mut PlayerRecord, hunt: &Hunt, dice: &mut impl Dice) -> HuntSummary {
    let outcome = hunt.combat.outcome.unwrap_or(Outcome::Fled);
    let template = &hunt.mob().template;
    player.general.set_hp(hunt.combat.player.current_hp);

    let mut summary = HuntSummary {
        outcome,
        mob_name: template.name.clone(),
        xp_gained: 0,
        xp: None,
        gold_gained: 0,
        gold_lost: 0,
        stamina_lost: 0,
        loot: BTreeMap::new(),
        quests_ready: Vec::new(),
        hp: 0,
        max_hp: 0,
    };

    match outcome {
        Outcome::Victory => {
            let rewards = roll_victory_rewards(template, dice);
            player.general.wallet += rewards.gold;
            apply_loot(player, &rewards.loot);
            summary.stamina_lost = 1u32.min(player.general.stamina);
            summary.xp_gained = scaled_xp(rewards.xp, hunt.combat.player.skill_bonus);
            summary.gold_gained = rewards.gold;
            summary.loot = rewards.loot;
            summary.quests_ready = record_progress(player, ObjectiveKind::Kill, &hunt.mob_id, 1);
        }
        Outcome::Defeat => {
            let penalty = defeat_penalty(template, player.general.wallet, dice);
            player.general.wallet -= penalty.gold_lost;
            summary.stamina_lost = penalty.stamina_lost.min(player.general.stamina);
            summary.xp_gained = penalty.xp;
            summary.gold_lost = penalty.gold_lost;
        }
        Outcome::Fled => {
            summary.stamina_lost = 1u32.min(player.general.stamina);
        }
    }
    player.general.stamina -= summary.stamina_lost;
    if summary.xp_gained > 0 {
        summary.xp = Some(award_player_xp(player, Skill::Combat, summary.xp_gained));
    }
    summary.hp = player.general.hp;
    summary.max_hp = player.general.max_hp;
    info!(
        "player {} hunt vs {} ended {:?} (+{} xp, +{} gold, -{} gold)",
        player.id, summary.mob_name, outcome, summary.xp_gained, summary.gold_gained, summary.gold_lost
    );
    summary
}
