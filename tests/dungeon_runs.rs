//! Dungeon floors end to end: clearing, defeat, grading and the in-dungeon flag.

mod common;

use starfall::game::dungeon::{finish, start_dungeon, DungeonPhase, SCORE_PER_MOB};
use starfall::game::types::Skill;
use starfall::game::{GameError, GameRules, PlayerAction, PlayerRecord, ScriptedDice};

#[test]
fn cleared_floor_pays_out_only_at_the_end() {
    let content = common::content();
    let mut player = PlayerRecord::new(1, "Aria", "plains", "pond");
    player.general.strength = 500;
    let mut dice = ScriptedDice::constant(0.9);
    let mut run = start_dungeon(&mut player, 2, &content, &GameRules::default(), &mut dice)
        .expect("start");
    let mut rounds = 0;
    while !run.is_over() {
        run.act(PlayerAction::Attack, &content, &mut dice).expect("act");
        assert_eq!(player.general.wallet, 0);
        rounds += 1;
        assert!(rounds < 200);
    }
    assert_eq!(run.phase, DungeonPhase::Complete);
    // nine combat rooms on floor two
    assert_eq!(run.score, 9 * SCORE_PER_MOB);
    assert_eq!(run.grade(), "S+");
    assert_eq!(run.kills.len(), 9);

    let summary = finish(&mut player, &run);
    assert_eq!(summary.grade, Some("S+"));
    assert_eq!(player.general.wallet, run.rewards.gold);
    assert!(player.skills.get(Skill::Combat).level > 0);
    assert!(!player.general.in_dungeon);
}

#[test]
fn defeat_keeps_nothing_and_blocks_the_next_delve() {
    let content = common::content();
    let mut player = PlayerRecord::new(2, "Bran", "plains", "pond");
    player.general.hp = 1;
    let mut dice = ScriptedDice::constant(0.9);
    let mut run = start_dungeon(&mut player, 1, &content, &GameRules::default(), &mut dice)
        .expect("start");
    assert!(player.general.in_dungeon);
    run.act(PlayerAction::Attack, &content, &mut dice).expect("act");
    assert_eq!(run.phase, DungeonPhase::PlayerDefeated);

    let summary = finish(&mut player, &run);
    assert_eq!(summary.grade, None);
    assert_eq!(summary.gold, 0);
    assert_eq!(player.general.hp, 0);
    assert_eq!(player.general.wallet, 0);
    assert!(!player.general.in_dungeon);

    let err = start_dungeon(&mut player, 1, &content, &GameRules::default(), &mut dice)
        .unwrap_err();
    assert!(matches!(err, GameError::Precondition(_)));
    assert!(!player.general.in_dungeon);
}

#[test]
fn only_one_dungeon_at_a_time() {
    let content = common::content();
    let mut player = PlayerRecord::new(3, "Cato", "plains", "pond");
    let mut dice = ScriptedDice::constant(0.9);
    let _run = start_dungeon(&mut player, 1, &content, &GameRules::default(), &mut dice)
        .expect("start");
    assert!(matches!(
        start_dungeon(&mut player, 1, &content, &GameRules::default(), &mut dice),
        Err(GameError::AlreadyInEncounter)
    ));
}

#[test]
fn grade_follows_score() {
    let content = common::content();
    let mut player = PlayerRecord::new(4, "Dara", "plains", "pond");
    let mut dice = ScriptedDice::constant(0.9);
    let mut run = start_dungeon(&mut player, 1, &content, &GameRules::default(), &mut dice)
        .expect("start");
    for (score, grade) in [(90, "S+"), (89, "S"), (39, "F")] {
        run.score = score;
        assert_eq!(run.grade(), grade);
    }
}
