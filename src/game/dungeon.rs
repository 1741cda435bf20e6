//! Dungeon runs: an ordered list of rooms per floor, walked by an explicit
//! phase machine. Rewards accrue on the run and only reach the player record
//! when the last room is cleared.

use std::collections::BTreeMap;

use log::{debug, info};

use crate::game::combat::{
    resolve_round, roll_victory_rewards, scaled_xp, score_to_grade, CombatEvent, CombatRules, CombatState,
    CombatantStats, MobInstance, Outcome, PlayerAction, Rewards,
};
use crate::game::content::{ContentTables, RoomDef};
use crate::game::dice::Dice;
use crate::game::equipment::derive_combatant;
use crate::game::errors::GameError;
use crate::game::inventory::apply_loot;
use crate::game::progression::{award_player_xp, XpAward};
use crate::game::quest::record_progress;
use crate::game::types::{ObjectiveKind, PlayerId, PlayerRecord, Skill};
use crate::game::GameRules;

pub const SCORE_PER_MOB: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DungeonPhase {
    AwaitingRoom,
    InCombat,
    RoomCleared,
    PlayerDefeated,
    PlayerFled,
    TimedOut,
    Complete,
}

impl DungeonPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DungeonPhase::PlayerDefeated
                | DungeonPhase::PlayerFled
                | DungeonPhase::TimedOut
                | DungeonPhase::Complete
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DungeonRun {
    pub player_id: PlayerId,
    pub floor: u32,
    pub rooms: Vec<RoomDef>,
    pub current_room: usize,
    pub score: u32,
    pub rewards: Rewards,
    pub kills: Vec<String>,
    pub player: CombatantStats,
    pub focus: u32,
    pub combat: Option<CombatState>,
    pub phase: DungeonPhase,
    pub rules: CombatRules,
    pub log: Vec<String>,
}

impl DungeonRun {
    pub fn is_over(&self) -> bool {
        self.phase.is_terminal()
    }

    fn note(&mut self, line: String) {
        debug!("dungeon {}: {}", self.player_id, line);
        self.log.push(line);
    }

    /// Walk the phase machine until it needs player input or reaches a terminal phase.
    pub fn advance(&mut self, content: &ContentTables, dice: &mut impl Dice) -> Result<(), GameError> {
        loop {
            match self.phase {
                DungeonPhase::RoomCleared => {
                    self.current_room += 1;
                    self.phase = DungeonPhase::AwaitingRoom;
                }
                DungeonPhase::AwaitingRoom => {
                    let Some(room) = self.rooms.get(self.current_room).cloned() else {
                        self.phase = DungeonPhase::Complete;
                        self.note(format!("Floor {} cleared!", self.floor));
                        return Ok(());
                    };
                    if !room.is_combat() {
                        self.note(format!(
                            "Room {}: a quiet {} room. You move on.",
                            self.current_room + 1,
                            room.kind
                        ));
                        self.current_room += 1;
                        continue;
                    }
                    let pool = content.floor_pool(self.floor)?;
                    let mob_id = &pool[dice.pick(pool.len())];
                    let template = content.dungeon_mob(mob_id)?;
                    self.combat = Some(
                        CombatState::new(
                            self.player,
                            vec![MobInstance::spawn(mob_id, template)],
                            self.rules,
                        )
                        .with_focus(self.focus),
                    );
                    self.phase = DungeonPhase::InCombat;
                    self.note(format!(
                        "Room {}: a {} blocks your path!",
                        self.current_room + 1,
                        template.name
                    ));
                    return Ok(());
                }
                _ => return Ok(()),
            }
        }
    }

    /// Resolve one player action in the current room.
    pub fn act(
        &mut self,
        action: PlayerAction,
        content: &ContentTables,
        dice: &mut impl Dice,
    ) -> Result<Vec<CombatEvent>, GameError> {
        if self.phase != DungeonPhase::InCombat {
            return Err(GameError::NoActiveEncounter);
        }
        let combat = self.combat.take().ok_or(GameError::NoActiveEncounter)?;
        let (combat, events) = resolve_round(combat, action, dice);
        self.player = combat.player;
        self.focus = combat.focus;
        for event in &events {
            self.note(event.to_string());
        }
        match combat.outcome {
            None => self.combat = Some(combat),
            Some(Outcome::Victory) => {
                for mob in &combat.mobs {
                    self.score += SCORE_PER_MOB;
                    self.rewards.merge(roll_victory_rewards(&mob.template, dice));
                    self.kills.push(mob.id.clone());
                }
                self.phase = DungeonPhase::RoomCleared;
                self.advance(content, dice)?;
            }
            Some(Outcome::Defeat) => self.phase = DungeonPhase::PlayerDefeated,
            Some(Outcome::Fled) => self.phase = DungeonPhase::PlayerFled,
        }
        Ok(events)
    }

    /// Idle prompt expired: forced flee, nothing earned.
    pub fn time_out(&mut self) {
        if !self.is_over() {
            self.combat = None;
            self.phase = DungeonPhase::TimedOut;
            self.note("You hesitate too long and retreat from the dungeon.".to_string());
        }
    }

    pub fn grade(&self) -> &'static str {
        score_to_grade(self.score)
    }
}

/// Check dungeon preconditions, mark the player as in a dungeon and enter the first room.
pub fn start_dungeon(
    player: &mut PlayerRecord,
    floor: u32,
    content: &ContentTables,
    rules: &GameRules,
    dice: &mut impl Dice,
) -> Result<DungeonRun, GameError> {
    if player.general.in_dungeon {
        return Err(GameError::AlreadyInEncounter);
    }
    let layout = content.floor(floor)?;
    content.floor_pool(floor)?;
    if player.general.hp == 0 {
        return Err(GameError::Precondition(
            "You're too injured to delve. Rest first.".to_string(),
        ));
    }
    let mut run = DungeonRun {
        player_id: player.id,
        floor,
        rooms: layout.rooms.clone(),
        current_room: 0,
        score: 0,
        rewards: Rewards::default(),
        kills: Vec::new(),
        player: derive_combatant(player, content),
        focus: 0,
        combat: None,
        phase: DungeonPhase::AwaitingRoom,
        rules: CombatRules {
            hit_rule: rules.dungeon_hit_rule,
            flee_chance: rules.flee_chance,
            focus_enabled: true,
        },
        log: vec![format!("You descend to floor {}.", floor)],
    };
    run.advance(content, dice)?;
    player.general.in_dungeon = true;
    info!("player {} entered dungeon floor {}", player.id, floor);
    Ok(run)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DungeonSummary {
    pub phase: DungeonPhase,
    pub floor: u32,
    pub score: u32,
    pub grade: Option<&'static str>,
    pub gold: u64,
    pub loot: BTreeMap<String, u32>,
    pub xp_gained: u32,
    pub xp: Option<XpAward>,
    pub hp: u32,
    pub max_hp: u32,
    pub quests_ready: Vec<String>,
}

/// Flush a run onto the player record and clear the dungeon flag.
///
/// Only a completed run pays out; every other ending keeps the HP and nothing else.
pub fn finish(player: &mut PlayerRecord, run: &DungeonRun) -> DungeonSummary {
    player.general.set_hp(run.player.current_hp);
    player.general.in_dungeon = false;
    let phase = if run.is_over() {
        run.phase
    } else {
        DungeonPhase::PlayerFled
    };
    let mut summary = DungeonSummary {
        phase,
        floor: run.floor,
        score: run.score,
        grade: None,
        gold: 0,
        loot: BTreeMap::new(),
        xp_gained: 0,
        xp: None,
        hp: 0,
        max_hp: 0,
        quests_ready: Vec::new(),
    };
    if phase == DungeonPhase::Complete {
        summary.grade = Some(run.grade());
        summary.gold = run.rewards.gold;
        summary.loot = run.rewards.loot.clone();
        summary.xp_gained = scaled_xp(run.rewards.xp, run.player.skill_bonus);
        player.general.wallet += run.rewards.gold;
        apply_loot(player, &run.rewards.loot);
        if summary.xp_gained > 0 {
            summary.xp = Some(award_player_xp(player, Skill::Combat, summary.xp_gained));
        }
        for mob_id in &run.kills {
            summary
                .quests_ready
                .extend(record_progress(player, ObjectiveKind::Kill, mob_id, 1));
        }
    }
    summary.hp = player.general.hp;
    summary.max_hp = player.general.max_hp;
    info!(
        "player {} left dungeon floor {}: {:?}, score {}",
        player.id, run.floor, phase, run.score
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::dice::ScriptedDice;

    fn setup() -> (PlayerRecord, ContentTables) {
        let mut player = PlayerRecord::new(21, "Aria", "plains", "pond");
        player.general.strength = 500;
        (player, ContentTables::builtin().expect("content"))
    }

    #[test]
    fn unknown_floor_is_missing_content() {
        let (mut player, content) = setup();
        let mut dice = ScriptedDice::constant(0.9);
        let err = start_dungeon(&mut player, 99, &content, &GameRules::default(), &mut dice)
            .unwrap_err();
        assert!(matches!(err, GameError::MissingContent(_)));
        assert!(!player.general.in_dungeon);
    }

    #[test]
    fn strong_player_clears_floor_and_is_paid_on_finish() {
        let (mut player, content) = setup();
        let mut dice = ScriptedDice::constant(0.9);
        let mut run =
            start_dungeon(&mut player, 1, &content, &GameRules::default(), &mut dice).expect("start");
        assert!(player.general.in_dungeon);
        assert_eq!(run.phase, DungeonPhase::InCombat);
        let combat_rooms = run.rooms.iter().filter(|r| r.is_combat()).count() as u32;

        let mut guard = 0;
        while !run.is_over() {
            run.act(PlayerAction::Attack, &content, &mut dice).expect("act");
            guard += 1;
            assert!(guard < 100);
        }
        assert_eq!(run.phase, DungeonPhase::Complete);
        assert_eq!(run.score, combat_rooms * SCORE_PER_MOB);
        assert_eq!(player.general.wallet, 0, "nothing paid before finish");

        let summary = finish(&mut player, &run);
        assert_eq!(summary.grade, Some(score_to_grade(run.score)));
        assert_eq!(player.general.wallet, run.rewards.gold);
        assert!(!player.general.in_dungeon);
        assert_eq!(summary.xp_gained, run.rewards.xp);

        let mut geared = run.clone();
        geared.player.skill_bonus = 0.5;
        let (mut other, _) = setup();
        let summary = finish(&mut other, &geared);
        assert_eq!(summary.xp_gained, run.rewards.xp * 3 / 2);
    }

    #[test]
    fn fleeing_keeps_hp_but_forfeits_rewards() {
        let (mut player, content) = setup();
        let mut dice = ScriptedDice::constant(0.9);
        let mut run =
            start_dungeon(&mut player, 1, &content, &GameRules::default(), &mut dice).expect("start");
        run.act(PlayerAction::Attack, &content, &mut dice).expect("clear first room");
        assert!(run.score > 0);
        let mut dice = ScriptedDice::constant(0.1);
        run.act(PlayerAction::Flee, &content, &mut dice).expect("flee");
        assert_eq!(run.phase, DungeonPhase::PlayerFled);
        let summary = finish(&mut player, &run);
        assert_eq!(summary.grade, None);
        assert_eq!(player.general.wallet, 0);
        assert_eq!(player.skills.get(Skill::Combat).xp, 0);
        assert!(!player.general.in_dungeon);
    }

    #[test]
    fn timeout_is_terminal_and_blocks_actions() {
        let (mut player, content) = setup();
        let mut dice = ScriptedDice::constant(0.9);
        let mut run =
            start_dungeon(&mut player, 1, &content, &GameRules::default(), &mut dice).expect("start");
        run.time_out();
        assert_eq!(run.phase, DungeonPhase::TimedOut);
        assert!(matches!(
            run.act(PlayerAction::Attack, &content, &mut dice),
            Err(GameError::NoActiveEncounter)
        ));
        let summary = finish(&mut player, &run);
        assert_eq!(summary.phase, DungeonPhase::TimedOut);
    }

    #[test]
    fn non_combat_rooms_are_skipped() {
        let (_, mut content) = setup();
        content.dungeon_floors.insert(
            "7".into(),
            crate::game::content::DungeonFloor {
                rooms: vec![
                    RoomDef { kind: "treasure".into() },
                    RoomDef { kind: "rest".into() },
                ],
            },
        );
        content.dungeon_pools.insert(
            "floor_7".into(),
            crate::game::content::DungeonPool { mobs: vec!["skeleton".into()] },
        );
        let mut player = PlayerRecord::new(1, "A", "plains", "pond");
        let mut dice = ScriptedDice::constant(0.9);
        let run =
            start_dungeon(&mut player, 7, &content, &GameRules::default(), &mut dice).expect("start");
        assert_eq!(run.phase, DungeonPhase::Complete);
        assert_eq!(run.grade(), "F");
    }
}
