//! NPC conversations: dialogue trees walked one numbered choice at a time.
//!
//! Nothing here touches the player record; the command layer keeps track of
//! which node each player is looking at and applies quest hand-outs.

use std::fmt::Write as _;

use crate::game::content::{ContentTables, DialogueNode, NpcDef};
use crate::game::errors::GameError;

pub const START_NODE: &str = "start";
pub const END_NODE: &str = "end";
const FAREWELL: &str = "Farewell, traveler.";

/// Where a conversation goes after a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueStep<'a> {
    Node { key: &'a str, node: &'a DialogueNode },
    GiveQuest(&'a str),
    End(&'a str),
}

impl NpcDef {
    /// The `start` node, or the first node when there is none by that name.
    pub fn opening(&self) -> Option<(&str, &DialogueNode)> {
        self.dialogue
            .get_key_value(START_NODE)
            .or_else(|| self.dialogue.iter().next())
            .map(|(key, node)| (key.as_str(), node))
    }
}

/// NPCs standing in a subarea, in id order.
pub fn npcs_here<'a>(content: &'a ContentTables, area: &str, subarea: &str) -> Vec<(&'a str, &'a NpcDef)> {
    content
        .npcs
        .iter()
        .filter(|(_, npc)| {
            npc.area.eq_ignore_ascii_case(area) && npc.sub_area.eq_ignore_ascii_case(subarea)
        })
        .map(|(id, npc)| (id.as_str(), npc))
        .collect()
}

/// Find an NPC in the subarea by id or by display name.
pub fn find_npc<'a>(
    content: &'a ContentTables,
    area: &str,
    subarea: &str,
    wanted: &str,
) -> Result<(&'a str, &'a NpcDef), GameError> {
    npcs_here(content, area, subarea)
        .into_iter()
        .find(|(id, npc)| id.eq_ignore_ascii_case(wanted) || npc.name.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| GameError::Precondition(format!("There's nobody called '{}' here.", wanted)))
}

/// Follow option `choice` (1-based) of `node_key`.
pub fn choose<'a>(npc: &'a NpcDef, node_key: &str, choice: usize) -> Result<DialogueStep<'a>, GameError> {
    let node = npc
        .dialogue
        .get(node_key)
        .ok_or_else(|| GameError::MissingContent(format!("dialogue node {} of {}", node_key, npc.name)))?;
    let option = choice
        .checked_sub(1)
        .and_then(|idx| node.options.get(idx))
        .ok_or_else(|| {
            GameError::Precondition(format!("Choose an option between 1 and {}.", node.options.len()))
        })?;
    if let Some(quest_id) = &option.give_quest {
        return Ok(DialogueStep::GiveQuest(quest_id.as_str()));
    }
    match option.next.as_deref() {
        Some(next) if next != END_NODE => {
            let (key, node) = npc.dialogue.get_key_value(next).ok_or_else(|| {
                GameError::MissingContent(format!("dialogue node {} of {}", next, npc.name))
            })?;
            Ok(DialogueStep::Node { key: key.as_str(), node })
        }
        _ => Ok(DialogueStep::End(option.text.as_deref().unwrap_or(FAREWELL))),
    }
}

pub fn render_node(npc: &NpcDef, node: &DialogueNode) -> String {
    let mut out = format!("{}: {}", npc.name, node.text);
    if let Some(lore) = &node.lore {
        let _ = write!(out, "\n{}", lore);
    }
    for (idx, option) in node.options.iter().enumerate() {
        let _ = write!(out, "\n  {}) {}", idx + 1, option.label);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> ContentTables {
        ContentTables::builtin().expect("content")
    }

    #[test]
    fn npcs_are_found_by_id_or_name_in_their_subarea() {
        let content = content();
        let here = npcs_here(&content, "plains", "pond");
        assert_eq!(here.len(), 1);
        let (id, _) = find_npc(&content, "plains", "pond", "old marta").expect("by name");
        assert_eq!(id, "marta");
        assert!(find_npc(&content, "plains", "pond", "MARTA").is_ok());
        assert!(matches!(
            find_npc(&content, "plains", "meadow", "marta"),
            Err(GameError::Precondition(_))
        ));
    }

    #[test]
    fn choices_walk_the_tree() {
        let content = content();
        let marta = &content.npcs["marta"];
        let (key, node) = marta.opening().expect("opening");
        assert_eq!(key, START_NODE);
        assert!(render_node(marta, node).contains("  1) Ask about the pond"));

        let DialogueStep::Node { key, node } = choose(marta, START_NODE, 1).expect("pond") else {
            panic!("expected a node");
        };
        assert_eq!(key, "pond");
        assert!(render_node(marta, node).contains("older than the plains"));
        assert_eq!(choose(marta, "pond", 2).expect("end"), DialogueStep::End(FAREWELL));
        assert_eq!(
            choose(marta, START_NODE, 2).expect("quest"),
            DialogueStep::GiveQuest("a_quiet_word")
        );
        assert!(matches!(
            choose(marta, START_NODE, 3).expect("bye"),
            DialogueStep::End(text) if text.contains("slimes")
        ));
    }

    #[test]
    fn out_of_range_choices_are_rejected() {
        let content = content();
        let brom = &content.npcs["brom"];
        assert!(matches!(choose(brom, START_NODE, 0), Err(GameError::Precondition(_))));
        assert!(matches!(choose(brom, START_NODE, 3), Err(GameError::Precondition(_))));
        assert!(matches!(choose(brom, "nowhere", 1), Err(GameError::MissingContent(_))));
    }
}
