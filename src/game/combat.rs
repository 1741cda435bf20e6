//! Turn-based combat resolution shared by hunts and dungeon rooms.
//!
//! `resolve_round` is a pure transition: it takes the encounter state by value,
//! applies one player action plus the mob's reply, and hands back the new state
//! together with the events that happened. Callers own persistence.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::game::content::{MobStats, MobTemplate, SpecialAttack};
use crate::game::dice::Dice;

pub const FOCUS_CAP: u32 = 100;
const FOCUS_ON_DEFEND: u32 = 15;
const FOCUS_ON_BLOCKED_HIT: u32 = 10;
const FOCUS_ON_BLOCKED_SPECIAL: u32 = 25;

/// HP, the four combat stats and weapon modifiers for one side of a fight.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CombatantStats {
    pub current_hp: u32,
    pub max_hp: u32,
    pub strength: u32,
    pub defense: u32,
    pub evasion: u32,
    pub accuracy: u32,
    pub crit_chance: f64,
    pub skill_bonus: f64,
}

impl CombatantStats {
    pub fn from_mob(stats: &MobStats) -> Self {
        Self {
            current_hp: stats.hp,
            max_hp: stats.hp,
            strength: stats.strength,
            defense: stats.defense,
            evasion: stats.evasion,
            accuracy: stats.accuracy,
            crit_chance: 0.0,
            skill_bonus: 0.0,
        }
    }

    /// Subtract damage, never dropping below zero. Returns the HP actually lost.
    pub fn apply_damage(&mut self, damage: u32) -> u32 {
        let lost = damage.min(self.current_hp);
        self.current_hp -= lost;
        lost
    }

    /// Restore HP up to `max_hp`. Returns the HP actually restored.
    pub fn heal(&mut self, amount: u32) -> u32 {
        let restored = amount.min(self.max_hp.saturating_sub(self.current_hp));
        self.current_hp += restored;
        restored
    }

    pub fn is_down(&self) -> bool {
        self.current_hp == 0
    }
}

/// Whether attacks roll accuracy against evasion or always land.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum HitRule {
    #[default]
    #[serde(rename = "always")]
    Always,
    #[serde(rename = "accuracy")]
    AccuracyVsEvasion,
}

/// `accuracy / (accuracy + evasion)`; a fight between two zero-stat sides always hits.
pub fn hit_chance(accuracy: u32, evasion: u32) -> f64 {
    let total = accuracy + evasion;
    if total == 0 {
        1.0
    } else {
        accuracy as f64 / total as f64
    }
}

/// `max(1, str - def / 2)`, doubled on a critical hit. Defend modifiers are applied by the caller.
pub fn resolve_attack(attacker: &CombatantStats, defender: &CombatantStats, is_crit: bool) -> u32 {
    let base = attacker.strength.saturating_sub(defender.defense / 2).max(1);
    if is_crit {
        base * 2
    } else {
        base
    }
}

/// Live copy of a mob template plus its per-encounter state.
#[derive(Debug, Clone, PartialEq)]
pub struct MobInstance {
    pub id: String,
    pub template: MobTemplate,
    pub stats: CombatantStats,
    pub is_defending: bool,
    pub telegraphed: Option<SpecialAttack>,
    pub telegraph_turns: u32,
}

impl MobInstance {
    pub fn spawn(id: &str, template: &MobTemplate) -> Self {
        Self {
            id: id.to_string(),
            template: template.clone(),
            stats: CombatantStats::from_mob(&template.stats),
            is_defending: false,
            telegraphed: None,
            telegraph_turns: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.template.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusSkill {
    Heal,
    Counter,
}

impl FocusSkill {
    pub fn cost(self) -> u32 {
        match self {
            FocusSkill::Heal => 50,
            FocusSkill::Counter => 30,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "heal" => Some(FocusSkill::Heal),
            "counter" => Some(FocusSkill::Counter),
            _ => None,
        }
    }
}

impl fmt::Display for FocusSkill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FocusSkill::Heal => f.write_str("heal"),
            FocusSkill::Counter => f.write_str("counter"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    Attack,
    Defend,
    Flee,
    Focus(FocusSkill),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Victory,
    Defeat,
    Fled,
}

/// Knobs that differ between encounter types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatRules {
    pub hit_rule: HitRule,
    pub flee_chance: f64,
    pub focus_enabled: bool,
}

impl Default for CombatRules {
    fn default() -> Self {
        Self {
            hit_rule: HitRule::AccuracyVsEvasion,
            flee_chance: 0.5,
            focus_enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombatState {
    pub player: CombatantStats,
    pub mobs: Vec<MobInstance>,
    pub current_mob: usize,
    pub player_defending: bool,
    pub focus: u32,
    pub countering: bool,
    pub rules: CombatRules,
    pub round: u32,
    pub outcome: Option<Outcome>,
}

impl CombatState {
    pub fn new(player: CombatantStats, mobs: Vec<MobInstance>, rules: CombatRules) -> Self {
        let outcome = if mobs.is_empty() {
            Some(Outcome::Victory)
        } else if player.is_down() {
            Some(Outcome::Defeat)
        } else {
            None
        };
        Self {
            player,
            mobs,
            current_mob: 0,
            player_defending: false,
            focus: 0,
            countering: false,
            rules,
            round: 0,
            outcome,
        }
    }

    pub fn with_focus(mut self, focus: u32) -> Self {
        self.focus = focus.min(FOCUS_CAP);
        self
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn current(&self) -> Option<&MobInstance> {
        self.mobs.get(self.current_mob)
    }

    fn gain_focus(&mut self, amount: u32) {
        if self.rules.focus_enabled {
            self.focus = (self.focus + amount).min(FOCUS_CAP);
        }
    }

    fn lands(&self, dice: &mut impl Dice, accuracy: u32, evasion: u32) -> bool {
        match self.rules.hit_rule {
            HitRule::Always => true,
            HitRule::AccuracyVsEvasion => dice.roll() <= hit_chance(accuracy, evasion),
        }
    }
}

/// Something that happened during a round, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum CombatEvent {
    PlayerHit { mob: String, damage: u32, crit: bool, blocked: bool },
    PlayerMissed { mob: String },
    PlayerDefends { focus: u32 },
    FleeSucceeded,
    FleeFailed,
    FocusHeal { restored: u32 },
    CounterReady,
    FocusUnavailable { skill: FocusSkill, needed: u32, have: u32 },
    MobDefends { mob: String },
    MobCharging { mob: String, attack: String, turns_left: u32 },
    MobTelegraphs { mob: String, attack: String, description: String },
    MobSpecial { mob: String, attack: String, damage: u32, blocked: bool },
    MobHit { mob: String, damage: u32, blocked: bool },
    MobMissed { mob: String },
    FreeAttack { mob: String, damage: u32 },
    Counter { mob: String, damage: u32 },
    MobDefeated { mob: String },
    PlayerDefeated,
    Victory,
}

impl fmt::Display for CombatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombatEvent::PlayerHit { mob, damage, crit, blocked } => {
                write!(f, "You hit the {} for {} damage", mob, damage)?;
                if *crit {
                    f.write_str(" (critical!)")?;
                }
                if *blocked {
                    f.write_str(" (blocked)")?;
                }
                Ok(())
            }
            CombatEvent::PlayerMissed { mob } => write!(f, "You missed the {}", mob),
            CombatEvent::PlayerDefends { focus } => {
                write!(f, "You brace yourself (focus {})", focus)
            }
            CombatEvent::FleeSucceeded => f.write_str("You escaped!"),
            CombatEvent::FleeFailed => f.write_str("You failed to escape!"),
            CombatEvent::FocusHeal { restored } => write!(f, "You recover {} HP", restored),
            CombatEvent::CounterReady => f.write_str("You ready a counter"),
            CombatEvent::FocusUnavailable { skill, needed, have } => {
                write!(f, "Not enough focus for {} ({}/{})", skill, have, needed)
            }
            CombatEvent::MobDefends { mob } => write!(f, "The {} takes a defensive stance", mob),
            CombatEvent::MobCharging { mob, attack, turns_left } => write!(
                f,
                "The {} is charging {} ({} turn(s) left)",
                mob, attack, turns_left
            ),
            CombatEvent::MobTelegraphs { mob, attack, description } => {
                write!(f, "The {} {} [{}]", mob, description, attack)
            }
            CombatEvent::MobSpecial { mob, attack, damage, blocked } => {
                write!(f, "The {} unleashes {} for {} damage", mob, attack, damage)?;
                if *blocked {
                    f.write_str(" (defended)")?;
                }
                Ok(())
            }
            CombatEvent::MobHit { mob, damage, blocked } => {
                write!(f, "The {} hits you for {} damage", mob, damage)?;
                if *blocked {
                    f.write_str(" (defended)")?;
                }
                Ok(())
            }
            CombatEvent::MobMissed { mob } => write!(f, "The {} missed you", mob),
            CombatEvent::FreeAttack { mob, damage } => {
                write!(f, "The {} strikes as you turn: {} damage", mob, damage)
            }
            CombatEvent::Counter { mob, damage } => {
                write!(f, "You counter the {} for {} damage", mob, damage)
            }
            CombatEvent::MobDefeated { mob } => write!(f, "The {} is defeated!", mob),
            CombatEvent::PlayerDefeated => f.write_str("You have been defeated..."),
            CombatEvent::Victory => f.write_str("Victory!"),
        }
    }
}

fn roll_crit(dice: &mut impl Dice, chance: f64) -> bool {
    chance > 0.0 && dice.roll() < chance
}

/// Resolve one player action and the current mob's reply.
///
/// A terminal state is returned unchanged with no events.
pub fn resolve_round(
    mut state: CombatState,
    action: PlayerAction,
    dice: &mut impl Dice,
) -> (CombatState, Vec<CombatEvent>) {
    let mut events = Vec::new();
    if state.is_over() || state.current_mob >= state.mobs.len() {
        return (state, events);
    }

    match action {
        PlayerAction::Attack => {
            state.round += 1;
            state.player_defending = false;
            if player_attack(&mut state, dice, &mut events) {
                return (state, events);
            }
            mob_turn(&mut state, dice, &mut events);
        }
        PlayerAction::Defend => {
            state.round += 1;
            state.player_defending = true;
            state.gain_focus(FOCUS_ON_DEFEND);
            events.push(CombatEvent::PlayerDefends { focus: state.focus });
            mob_turn(&mut state, dice, &mut events);
        }
        PlayerAction::Flee => {
            state.round += 1;
            if dice.roll() < state.rules.flee_chance {
                state.outcome = Some(Outcome::Fled);
                events.push(CombatEvent::FleeSucceeded);
            } else {
                events.push(CombatEvent::FleeFailed);
                free_attack(&mut state, &mut events);
            }
        }
        PlayerAction::Focus(skill) => {
            if !state.rules.focus_enabled || state.focus < skill.cost() {
                events.push(CombatEvent::FocusUnavailable {
                    skill,
                    needed: skill.cost(),
                    have: state.focus,
                });
                return (state, events);
            }
            state.round += 1;
            state.focus -= skill.cost();
            match skill {
                FocusSkill::Heal => {
                    let amount = (state.player.max_hp * 30 / 100).max(1);
                    let restored = state.player.heal(amount);
                    events.push(CombatEvent::FocusHeal { restored });
                }
                FocusSkill::Counter => {
                    state.countering = true;
                    events.push(CombatEvent::CounterReady);
                }
            }
            mob_turn(&mut state, dice, &mut events);
        }
    }
    (state, events)
}

/// Player strikes the current mob. Returns true when the round ends without a mob turn.
fn player_attack(state: &mut CombatState, dice: &mut impl Dice, events: &mut Vec<CombatEvent>) -> bool {
    let idx = state.current_mob;
    let name = state.mobs[idx].name().to_string();
    if !state.lands(dice, state.player.accuracy, state.mobs[idx].stats.evasion) {
        events.push(CombatEvent::PlayerMissed { mob: name });
        return false;
    }
    let crit = roll_crit(dice, state.player.crit_chance);
    let mob = &mut state.mobs[idx];
    let mut damage = resolve_attack(&state.player, &mob.stats, crit);
    let blocked = mob.is_defending;
    if blocked {
        damage = (damage / 2).max(1);
        mob.is_defending = false;
    }
    mob.stats.apply_damage(damage);
    events.push(CombatEvent::PlayerHit {
        mob: name,
        damage,
        crit,
        blocked,
    });
    settle_mob_hp(state, events)
}

/// After damage to the current mob: move on or end the fight. True when the mob died.
fn settle_mob_hp(state: &mut CombatState, events: &mut Vec<CombatEvent>) -> bool {
    let idx = state.current_mob;
    if !state.mobs[idx].stats.is_down() {
        return false;
    }
    events.push(CombatEvent::MobDefeated {
        mob: state.mobs[idx].name().to_string(),
    });
    match state.mobs.iter().position(|m| !m.stats.is_down()) {
        Some(next) => state.current_mob = next,
        None => {
            state.outcome = Some(Outcome::Victory);
            events.push(CombatEvent::Victory);
        }
    }
    true
}

fn settle_player_hp(state: &mut CombatState, events: &mut Vec<CombatEvent>) {
    if state.player.is_down() {
        state.outcome = Some(Outcome::Defeat);
        events.push(CombatEvent::PlayerDefeated);
    }
}

/// A failed flee: the mob lands one plain hit that ignores evasion and defend.
fn free_attack(state: &mut CombatState, events: &mut Vec<CombatEvent>) {
    let mob = &state.mobs[state.current_mob];
    let damage = resolve_attack(&mob.stats, &state.player, false);
    let name = mob.name().to_string();
    state.player.apply_damage(damage);
    events.push(CombatEvent::FreeAttack { mob: name, damage });
    settle_player_hp(state, events);
}

fn mob_turn(state: &mut CombatState, dice: &mut impl Dice, events: &mut Vec<CombatEvent>) {
    let idx = state.current_mob;
    let name = state.mobs[idx].name().to_string();

    if let Some(special) = state.mobs[idx].telegraphed.clone() {
        let mob = &mut state.mobs[idx];
        mob.telegraph_turns = mob.telegraph_turns.saturating_sub(1);
        if mob.telegraph_turns > 0 {
            events.push(CombatEvent::MobCharging {
                mob: name,
                attack: special.name,
                turns_left: mob.telegraph_turns,
            });
            return;
        }
        mob.telegraphed = None;
        let base = resolve_attack(&mob.stats, &state.player, false);
        let mut damage = ((base as f64 * special.damage_multiplier) as u32).max(1);
        let blocked = state.player_defending;
        if blocked {
            damage = (damage / 4).max(1);
            state.player_defending = false;
            state.gain_focus(FOCUS_ON_BLOCKED_SPECIAL);
        }
        state.player.apply_damage(damage);
        events.push(CombatEvent::MobSpecial {
            mob: name,
            attack: special.name,
            damage,
            blocked,
        });
        settle_player_hp(state, events);
        return;
    }

    let behavior = state.mobs[idx].template.behavior;
    let action_roll = dice.roll();
    if action_roll < behavior.special_chance() {
        let mob = &mut state.mobs[idx];
        let special = match mob.template.special_attacks.len() {
            0 => SpecialAttack::default(),
            1 => mob.template.special_attacks[0].clone(),
            n => mob.template.special_attacks[dice.pick(n)].clone(),
        };
        mob.telegraph_turns = special.telegraph_turns.max(1);
        events.push(CombatEvent::MobTelegraphs {
            mob: name,
            attack: special.name.clone(),
            description: special.description.clone(),
        });
        mob.telegraphed = Some(special);
        return;
    }
    if action_roll < behavior.special_chance() + behavior.defend_chance() {
        state.mobs[idx].is_defending = true;
        events.push(CombatEvent::MobDefends { mob: name });
        return;
    }

    let mob_stats = state.mobs[idx].stats;
    if !state.lands(dice, mob_stats.accuracy, state.player.evasion) {
        events.push(CombatEvent::MobMissed { mob: name });
        return;
    }
    let crit = roll_crit(dice, mob_stats.crit_chance);
    let mut damage = resolve_attack(&mob_stats, &state.player, crit);
    let blocked = state.player_defending;
    if blocked {
        damage = (damage / 2).max(1);
        state.player_defending = false;
        state.gain_focus(FOCUS_ON_BLOCKED_HIT);
    }
    state.player.apply_damage(damage);
    events.push(CombatEvent::MobHit {
        mob: name.clone(),
        damage,
        blocked,
    });
    if state.player.is_down() {
        settle_player_hp(state, events);
        return;
    }
    if state.countering {
        state.countering = false;
        let damage = resolve_attack(&state.player, &state.mobs[idx].stats, false);
        state.mobs[idx].stats.apply_damage(damage);
        events.push(CombatEvent::Counter { mob: name, damage });
        settle_mob_hp(state, events);
    }
}

/// Gold, XP and items won from one mob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rewards {
    pub xp: u32,
    pub gold: u64,
    pub loot: BTreeMap<String, u32>,
}

impl Rewards {
    pub fn merge(&mut self, other: Rewards) {
        self.xp += other.xp;
        self.gold += other.gold;
        for (item, qty) in other.loot {
            *self.loot.entry(item).or_insert(0) += qty;
        }
    }
}

/// Roll gold and every loot-table entry for a defeated mob.
pub fn roll_victory_rewards(mob: &MobTemplate, dice: &mut impl Dice) -> Rewards {
    let mut rewards = Rewards {
        xp: mob.xp,
        gold: dice.between(mob.gold[0], mob.gold[1]) as u64,
        loot: BTreeMap::new(),
    };
    for entry in &mob.loot_table {
        if dice.roll() < entry.chance {
            let qty = dice.between(entry.quantity[0], entry.quantity[1]);
            if qty > 0 {
                *rewards.loot.entry(entry.item.clone()).or_insert(0) += qty;
            }
        }
    }
    rewards
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefeatPenalty {
    pub xp: u32,
    pub gold_lost: u64,
    pub stamina_lost: u32,
}

/// A fifth of the mob's XP, a 10-25 gold fine capped at the wallet, and 10-25 stamina.
pub fn defeat_penalty(mob: &MobTemplate, wallet: u64, dice: &mut impl Dice) -> DefeatPenalty {
    let fine = dice.between(10, 25) as u64;
    DefeatPenalty {
        xp: mob.xp / 5,
        gold_lost: fine.min(wallet),
        stamina_lost: dice.between(10, 25),
    }
}

/// Combat XP after the gear `SKILL` bonus, a fraction added on top (0.05 = +5%).
pub fn scaled_xp(xp: u32, skill_bonus: f64) -> u32 {
    (xp as f64 * (1.0 + skill_bonus.max(0.0))) as u32
}

pub fn score_to_grade(score: u32) -> &'static str {
    match score {
        90.. => "S+",
        80..=89 => "S",
        70..=79 => "A",
        60..=69 => "B",
        50..=59 => "C",
        40..=49 => "D",
        _ => "F",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::content::{LootEntry, MobBehavior};
    use crate::game::dice::ScriptedDice;

    fn stats(hp: u32, strength: u32, defense: u32) -> CombatantStats {
        CombatantStats {
            current_hp: hp,
            max_hp: hp,
            strength,
            defense,
            evasion: 5,
            accuracy: 5,
            ..Default::default()
        }
    }

    fn template(behavior: MobBehavior) -> MobTemplate {
        MobTemplate {
            name: "Goblin".into(),
            stats: MobStats { hp: 30, strength: 8, defense: 4, evasion: 5, accuracy: 5 },
            behavior,
            xp: 50,
            gold: [10, 20],
            loot_table: vec![LootEntry { item: "bone".into(), chance: 1.0, quantity: [1, 1] }],
            special_attacks: Vec::new(),
        }
    }

    fn dungeon_rules() -> CombatRules {
        CombatRules { hit_rule: HitRule::Always, flee_chance: 0.5, focus_enabled: true }
    }

    #[test]
    fn damage_floor_is_one() {
        for strength in 0..30 {
            for defense in 0..60 {
                let d = resolve_attack(&stats(10, strength, 0), &stats(10, 0, defense), false);
                assert!(d >= 1);
            }
        }
        assert_eq!(resolve_attack(&stats(10, 10, 0), &stats(10, 0, 5), false), 8);
        assert_eq!(resolve_attack(&stats(10, 10, 0), &stats(10, 0, 5), true), 16);
    }

    #[test]
    fn hp_never_leaves_bounds() {
        let mut s = stats(20, 1, 1);
        assert_eq!(s.apply_damage(500), 20);
        assert_eq!(s.current_hp, 0);
        assert_eq!(s.heal(500), 20);
        assert_eq!(s.current_hp, 20);
    }

    #[test]
    fn hit_chance_handles_zero_stats() {
        assert_eq!(hit_chance(0, 0), 1.0);
        assert_eq!(hit_chance(3, 1), 0.75);
        assert_eq!(hit_chance(0, 4), 0.0);
    }

    #[test]
    fn defending_mob_halves_and_clears() {
        let mut mob = MobInstance::spawn("goblin", &template(MobBehavior::Aggressive));
        mob.is_defending = true;
        let state = CombatState::new(stats(100, 10, 2), vec![mob], dungeon_rules());
        // attack lands (always), mob then rolls 0.9 -> normal attack
        let mut dice = ScriptedDice::new([0.9]);
        let (state, events) = resolve_round(state, PlayerAction::Attack, &mut dice);
        assert_eq!(
            events[0],
            CombatEvent::PlayerHit { mob: "Goblin".into(), damage: 4, crit: false, blocked: true }
        );
        assert!(!state.mobs[0].is_defending);
        assert_eq!(state.mobs[0].stats.current_hp, 26);
    }

    #[test]
    fn player_defend_builds_focus_and_blocks() {
        let mob = MobInstance::spawn("goblin", &template(MobBehavior::Aggressive));
        let state = CombatState::new(stats(100, 10, 0), vec![mob], dungeon_rules());
        let mut dice = ScriptedDice::new([0.9]);
        let (state, events) = resolve_round(state, PlayerAction::Defend, &mut dice);
        // goblin str 8 vs def 0 = 8, halved = 4
        assert_eq!(events[1], CombatEvent::MobHit { mob: "Goblin".into(), damage: 4, blocked: true });
        assert_eq!(state.focus, 25);
        assert!(!state.player_defending);
        assert_eq!(state.player.current_hp, 96);
    }

    #[test]
    fn telegraphed_special_lands_after_countdown() {
        let mob = MobInstance::spawn("goblin", &template(MobBehavior::Aggressive));
        let state = CombatState::new(stats(100, 1, 0), vec![mob], dungeon_rules());
        // round 1: mob rolls 0.05 -> begins default Power Attack (1 turn)
        let mut dice = ScriptedDice::new([0.05]);
        let (state, events) = resolve_round(state, PlayerAction::Defend, &mut dice);
        assert!(matches!(events[1], CombatEvent::MobTelegraphs { .. }));
        assert_eq!(state.mobs[0].telegraph_turns, 1);
        assert_eq!(state.player.current_hp, 100);
        // round 2: player defends again, special executes: 8*2 = 16, quartered = 4
        let (state, events) = resolve_round(state, PlayerAction::Defend, &mut dice);
        assert_eq!(
            events[1],
            CombatEvent::MobSpecial {
                mob: "Goblin".into(),
                attack: "Power Attack".into(),
                damage: 4,
                blocked: true
            }
        );
        assert_eq!(state.focus, 15 + 15 + 25);
        assert!(state.mobs[0].telegraphed.is_none());
    }

    #[test]
    fn multi_turn_special_reports_charging() {
        let mut tpl = template(MobBehavior::Ranged);
        tpl.special_attacks = vec![SpecialAttack {
            name: "Volley".into(),
            telegraph_turns: 2,
            damage_multiplier: 3.0,
            description: "nocks three arrows".into(),
        }];
        let mob = MobInstance::spawn("archer", &tpl);
        let state = CombatState::new(stats(100, 1, 0), vec![mob], dungeon_rules());
        let mut dice = ScriptedDice::new([0.1]);
        let (state, _) = resolve_round(state, PlayerAction::Defend, &mut dice);
        let (state, events) = resolve_round(state, PlayerAction::Defend, &mut dice);
        assert!(matches!(events[1], CombatEvent::MobCharging { turns_left: 1, .. }));
        // undefended: 8 * 3 = 24
        let (state, events) = resolve_round(state, PlayerAction::Attack, &mut dice);
        assert!(matches!(events.last(), Some(CombatEvent::MobSpecial { damage: 24, blocked: false, .. })));
        assert_eq!(state.player.current_hp, 76);
    }

    #[test]
    fn failed_flee_gives_free_unmitigated_hit() {
        let mob = MobInstance::spawn("goblin", &template(MobBehavior::Aggressive));
        let mut state = CombatState::new(stats(100, 1, 0), vec![mob], dungeon_rules());
        state.player_defending = true;
        let mut dice = ScriptedDice::new([0.7]);
        let (state, events) = resolve_round(state, PlayerAction::Flee, &mut dice);
        assert_eq!(events[0], CombatEvent::FleeFailed);
        assert_eq!(events[1], CombatEvent::FreeAttack { mob: "Goblin".into(), damage: 8 });
        assert!(!state.is_over());
        let mut dice = ScriptedDice::new([0.2]);
        let (state, events) = resolve_round(state, PlayerAction::Flee, &mut dice);
        assert_eq!(events, vec![CombatEvent::FleeSucceeded]);
        assert_eq!(state.outcome, Some(Outcome::Fled));
    }

    #[test]
    fn killing_blow_ends_round_without_reply() {
        let mut mob = MobInstance::spawn("goblin", &template(MobBehavior::Aggressive));
        mob.stats.current_hp = 3;
        let state = CombatState::new(stats(100, 10, 0), vec![mob], dungeon_rules());
        let mut dice = ScriptedDice::constant(0.9);
        let (state, events) = resolve_round(state, PlayerAction::Attack, &mut dice);
        assert_eq!(state.outcome, Some(Outcome::Victory));
        assert_eq!(events.last(), Some(&CombatEvent::Victory));
        assert_eq!(state.player.current_hp, 100);
        let (same, events) = resolve_round(state.clone(), PlayerAction::Attack, &mut dice);
        assert!(events.is_empty());
        assert_eq!(same, state);
    }

    #[test]
    fn focus_skills_spend_focus() {
        let mob = MobInstance::spawn("goblin", &template(MobBehavior::Aggressive));
        let mut player = stats(100, 10, 0);
        player.current_hp = 40;
        let state = CombatState::new(player, vec![mob], dungeon_rules()).with_focus(80);
        let mut dice = ScriptedDice::constant(0.9);
        let (state, events) = resolve_round(state, PlayerAction::Focus(FocusSkill::Heal), &mut dice);
        assert_eq!(events[0], CombatEvent::FocusHeal { restored: 30 });
        assert_eq!(state.focus, 30);
        let (state, events) =
            resolve_round(state, PlayerAction::Focus(FocusSkill::Counter), &mut dice);
        assert_eq!(events[0], CombatEvent::CounterReady);
        // goblin def 4 -> 10 - 2 = 8 counter damage
        assert_eq!(events.last(), Some(&CombatEvent::Counter { mob: "Goblin".into(), damage: 8 }));
        assert_eq!(state.focus, 0);
        let round = state.round;
        let (state, events) =
            resolve_round(state, PlayerAction::Focus(FocusSkill::Counter), &mut dice);
        assert!(matches!(events[0], CombatEvent::FocusUnavailable { have: 0, .. }));
        assert_eq!(state.round, round);
    }

    #[test]
    fn focus_is_disabled_for_hunts() {
        let mob = MobInstance::spawn("goblin", &template(MobBehavior::Aggressive));
        let state =
            CombatState::new(stats(100, 10, 0), vec![mob], CombatRules::default()).with_focus(100);
        let mut dice = ScriptedDice::constant(0.9);
        let (_, events) = resolve_round(state, PlayerAction::Focus(FocusSkill::Heal), &mut dice);
        assert!(matches!(events[0], CombatEvent::FocusUnavailable { .. }));
    }

    #[test]
    fn victory_rewards_follow_table() {
        let tpl = template(MobBehavior::Aggressive);
        let mut rng = ScriptedDice::new([0.0, 0.5]);
        let rewards = roll_victory_rewards(&tpl, &mut rng);
        assert_eq!(rewards.gold, 10);
        assert_eq!(rewards.xp, 50);
        assert_eq!(rewards.loot.get("bone"), Some(&1));
    }

    #[test]
    fn defeat_penalty_caps_at_wallet() {
        let tpl = template(MobBehavior::Aggressive);
        let mut dice = ScriptedDice::constant(0.999);
        let penalty = defeat_penalty(&tpl, 12, &mut dice);
        assert_eq!(penalty, DefeatPenalty { xp: 10, gold_lost: 12, stamina_lost: 25 });
    }

    #[test]
    fn hunt_attacks_can_miss() {
        let mob = MobInstance::spawn("goblin", &template(MobBehavior::Aggressive));
        let state = CombatState::new(stats(100, 10, 0), vec![mob], CombatRules::default());
        // 5 acc vs 5 eva: 0.5 to hit. player rolls 0.6, mob attacks and lands on 0.4
        let mut dice = ScriptedDice::new([0.6, 0.9, 0.4]);
        let (state, events) = resolve_round(state, PlayerAction::Attack, &mut dice);
        assert_eq!(
            events,
            vec![
                CombatEvent::PlayerMissed { mob: "Goblin".into() },
                CombatEvent::MobHit { mob: "Goblin".into(), damage: 8, blocked: false },
            ]
        );
        assert_eq!(state.mobs[0].stats.current_hp, 30);
        assert_eq!(state.player.current_hp, 92);
        assert_eq!(dice.remaining(), 0);
    }

    #[test]
    fn roll_equal_to_hit_chance_lands() {
        let mob = MobInstance::spawn("goblin", &template(MobBehavior::Aggressive));
        let state = CombatState::new(stats(100, 10, 0), vec![mob], CombatRules::default());
        let mut dice = ScriptedDice::new([0.5, 0.9, 0.500_001]);
        let (state, events) = resolve_round(state, PlayerAction::Attack, &mut dice);
        assert!(matches!(events[0], CombatEvent::PlayerHit { damage: 8, .. }));
        assert_eq!(events[1], CombatEvent::MobMissed { mob: "Goblin".into() });
        assert_eq!(state.player.current_hp, 100);
    }

    #[test]
    fn mob_miss_keeps_the_defend_stance() {
        let mob = MobInstance::spawn("goblin", &template(MobBehavior::Aggressive));
        let state = CombatState::new(stats(100, 10, 0), vec![mob], CombatRules::default());
        let mut dice = ScriptedDice::new([0.9, 0.6]);
        let (state, events) = resolve_round(state, PlayerAction::Defend, &mut dice);
        assert_eq!(events[1], CombatEvent::MobMissed { mob: "Goblin".into() });
        assert!(state.player_defending);
        assert_eq!(state.player.current_hp, 100);

        // the stance is still there for the next hit
        let mut dice = ScriptedDice::new([0.9, 0.1]);
        let (state, events) = resolve_round(state, PlayerAction::Defend, &mut dice);
        assert_eq!(events[1], CombatEvent::MobHit { mob: "Goblin".into(), damage: 4, blocked: true });
        assert!(!state.player_defending);
    }

    fn mob_reply(behavior: MobBehavior, roll: f64) -> CombatEvent {
        let mob = MobInstance::spawn("goblin", &template(behavior));
        let state = CombatState::new(stats(100, 10, 0), vec![mob], dungeon_rules());
        let mut dice = ScriptedDice::new([roll]);
        let (_, mut events) = resolve_round(state, PlayerAction::Defend, &mut dice);
        events.remove(1)
    }

    #[test]
    fn ranged_mobs_favour_specials_and_cover() {
        assert!(matches!(mob_reply(MobBehavior::Ranged, 0.24), CombatEvent::MobTelegraphs { .. }));
        assert!(matches!(mob_reply(MobBehavior::Ranged, 0.44), CombatEvent::MobDefends { .. }));
        assert!(matches!(mob_reply(MobBehavior::Ranged, 0.46), CombatEvent::MobHit { .. }));
        // the same rolls against an aggressive mob
        assert!(matches!(mob_reply(MobBehavior::Aggressive, 0.24), CombatEvent::MobDefends { .. }));
        assert!(matches!(mob_reply(MobBehavior::Aggressive, 0.26), CombatEvent::MobHit { .. }));
    }

    #[test]
    fn other_mobs_mostly_defend() {
        assert!(matches!(mob_reply(MobBehavior::Other, 0.09), CombatEvent::MobTelegraphs { .. }));
        assert!(matches!(mob_reply(MobBehavior::Other, 0.11), CombatEvent::MobDefends { .. }));
        assert!(matches!(mob_reply(MobBehavior::Other, 0.39), CombatEvent::MobDefends { .. }));
        assert!(matches!(mob_reply(MobBehavior::Other, 0.41), CombatEvent::MobHit { .. }));
    }

    #[test]
    fn skill_bonus_scales_xp() {
        assert_eq!(scaled_xp(50, 0.0), 50);
        assert_eq!(scaled_xp(50, 0.05), 52);
        assert_eq!(scaled_xp(100, 0.25), 125);
        assert_eq!(scaled_xp(100, -1.0), 100);
    }

    #[test]
    fn grade_bands() {
        assert_eq!(score_to_grade(90), "S+");
        assert_eq!(score_to_grade(89), "S");
        assert_eq!(score_to_grade(70), "A");
        assert_eq!(score_to_grade(50), "C");
        assert_eq!(score_to_grade(40), "D");
        assert_eq!(score_to_grade(39), "F");
        assert_eq!(score_to_grade(0), "F");
    }
}
