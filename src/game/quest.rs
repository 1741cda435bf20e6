//! Quest lifecycle: accepting quests, tracking objective progress and
//! paying out rewards.
//!
//! All functions mutate a loaded `PlayerRecord`; the caller persists it.

use chrono::Utc;
use log::info;

use crate::game::content::{ContentTables, QuestDef};
use crate::game::equipment::grant_gear;
use crate::game::errors::GameError;
use crate::game::inventory::add_items;
use crate::game::progression::{award_player_xp, XpAward};
use crate::game::types::{ObjectiveKind, ObjectiveProgress, PlayerQuest, PlayerRecord, Skill};

/// Check whether a quest can be accepted (not taken before, prerequisites complete)
pub fn can_accept_quest(player: &PlayerRecord, quest: &QuestDef) -> bool {
    let taken = player.quests.completed.contains(&quest.quest_id)
        || player
            .quests
            .active
            .iter()
            .any(|pq| pq.quest_id == quest.quest_id);
    !taken
        && quest
            .prerequisites
            .iter()
            .all(|prereq| player.quests.completed.contains(prereq))
}

/// Quests the player could accept right now.
pub fn available_quests<'a>(player: &PlayerRecord, content: &'a ContentTables) -> Vec<&'a QuestDef> {
    content
        .quests
        .iter()
        .filter(|q| can_accept_quest(player, q))
        .collect()
}

pub fn accept_quest<'a>(
    player: &mut PlayerRecord,
    quest_id: &str,
    content: &'a ContentTables,
) -> Result<&'a QuestDef, GameError> {
    let quest = content.quest(quest_id)?;
    if !can_accept_quest(player, quest) {
        return Err(GameError::Precondition(
            "Cannot accept quest (prerequisites not met or already accepted)".to_string(),
        ));
    }
    let objectives = quest
        .objectives
        .iter()
        .map(|o| ObjectiveProgress {
            kind: o.kind,
            target: o.target.clone(),
            required: o.amount,
            current: 0,
        })
        .collect();
    player.quests.active.push(PlayerQuest {
        quest_id: quest.quest_id.clone(),
        accepted_at: Utc::now(),
        objectives,
    });
    info!("player {} accepted quest {}", player.id, quest.quest_id);
    Ok(quest)
}

/// Advance every active objective of `kind` that targets `target`.
///
/// Returns ids of quests whose objectives all became complete with this update.
pub fn record_progress(
    player: &mut PlayerRecord,
    kind: ObjectiveKind,
    target: &str,
    amount: u32,
) -> Vec<String> {
    let mut ready = Vec::new();
    for quest in &mut player.quests.active {
        let was_complete = quest.all_objectives_complete();
        for objective in &mut quest.objectives {
            if objective.kind == kind && objective.target == target {
                objective.current = (objective.current + amount).min(objective.required);
            }
        }
        if !was_complete && quest.all_objectives_complete() {
            ready.push(quest.quest_id.clone());
        }
    }
    ready
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestCompletion {
    pub name: String,
    pub gold: u64,
    pub xp: Option<XpAward>,
    pub items: Vec<String>,
    pub recipes: Vec<String>,
}

/// Pay out rewards and move the quest to the completed set.
pub fn complete_quest(
    player: &mut PlayerRecord,
    quest_id: &str,
    content: &ContentTables,
) -> Result<QuestCompletion, GameError> {
    let quest = content.quest(quest_id)?;
    let pos = player
        .quests
        .active
        .iter()
        .position(|pq| pq.quest_id == quest_id)
        .ok_or_else(|| GameError::Precondition(format!("Quest {} is not active.", quest_id)))?;
    if !player.quests.active[pos].all_objectives_complete() {
        return Err(GameError::Precondition(
            "Not all objectives are complete yet.".to_string(),
        ));
    }
    player.quests.active.remove(pos);
    player.quests.completed.insert(quest_id.to_string());

    let rewards = &quest.rewards;
    player.general.wallet += rewards.gold;
    let xp = (rewards.xp > 0).then(|| award_player_xp(player, Skill::Combat, rewards.xp));
    for item in &rewards.items {
        if content.template(item).is_some() {
            grant_gear(player, item);
        } else {
            add_items(&mut player.inventory, item, 1);
        }
    }
    for recipe in &rewards.recipes {
        player.recipes.insert(recipe.clone());
    }
    info!("player {} completed quest {}", player.id, quest_id);
    Ok(QuestCompletion {
        name: quest.name.clone(),
        gold: rewards.gold,
        xp,
        items: rewards.items.clone(),
        recipes: rewards.recipes.clone(),
    })
}

pub fn abandon_quest(player: &mut PlayerRecord, quest_id: &str) -> Result<(), GameError> {
    let before = player.quests.active.len();
    player.quests.active.retain(|pq| pq.quest_id != quest_id);
    if player.quests.active.len() == before {
        return Err(GameError::Precondition(format!(
            "Quest {} is not active.",
            quest_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (PlayerRecord, ContentTables) {
        (
            PlayerRecord::new(1, "Aria", "plains", "pond"),
            ContentTables::builtin().expect("content"),
        )
    }

    #[test]
    fn prerequisites_gate_acceptance() {
        let (mut player, content) = setup();
        let ids: Vec<&str> = available_quests(&player, &content)
            .iter()
            .map(|q| q.quest_id.as_str())
            .collect();
        assert!(ids.contains(&"first_steps"));
        assert!(!ids.contains(&"wolf_trouble"));
        assert!(accept_quest(&mut player, "wolf_trouble", &content).is_err());
        accept_quest(&mut player, "first_steps", &content).expect("accept");
        assert!(accept_quest(&mut player, "first_steps", &content).is_err());
    }

    #[test]
    fn progress_then_complete_pays_rewards() {
        let (mut player, content) = setup();
        accept_quest(&mut player, "first_steps", &content).expect("accept");
        assert!(complete_quest(&mut player, "first_steps", &content).is_err());

        let quest = content.quest("first_steps").expect("quest");
        let mut ready = Vec::new();
        for objective in &quest.objectives {
            ready = record_progress(&mut player, objective.kind, &objective.target, objective.amount);
        }
        assert_eq!(ready, vec!["first_steps".to_string()]);

        let wallet = player.general.wallet;
        let done = complete_quest(&mut player, "first_steps", &content).expect("complete");
        assert_eq!(player.general.wallet, wallet + quest.rewards.gold);
        assert_eq!(done.gold, quest.rewards.gold);
        assert!(player.quests.completed.contains("first_steps"));
        assert!(player.quests.active.is_empty());
        assert!(available_quests(&player, &content)
            .iter()
            .any(|q| q.quest_id == "wolf_trouble"));
    }

    #[test]
    fn progress_is_capped_at_required() {
        let (mut player, content) = setup();
        player.quests.completed.insert("first_steps".into());
        accept_quest(&mut player, "wolf_trouble", &content).expect("accept");
        record_progress(&mut player, ObjectiveKind::Kill, "wolf", 50);
        let objective = &player.quests.active[0].objectives[0];
        assert_eq!(objective.current, objective.required);
        record_progress(&mut player, ObjectiveKind::Kill, "slime", 1);
        assert!(record_progress(&mut player, ObjectiveKind::Kill, "wolf", 1).is_empty());
    }

    #[test]
    fn abandon_removes_active_quest() {
        let (mut player, content) = setup();
        accept_quest(&mut player, "first_steps", &content).expect("accept");
        abandon_quest(&mut player, "first_steps").expect("abandon");
        assert!(abandon_quest(&mut player, "first_steps").is_err());
        assert!(can_accept_quest(&player, content.quest("first_steps").expect("quest")));
    }
}
