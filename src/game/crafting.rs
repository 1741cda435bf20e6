use chrono::{DateTime, Utc};
use log::info;

use crate::game::content::ContentTables;
use crate::game::equipment::grant_gear;
use crate::game::errors::GameError;
use crate::game::inventory::{add_items, remove_items};
use crate::game::progression::{award_player_xp, regenerate_stamina, XpAward};
use crate::game::types::{PlayerRecord, Skill};
use crate::game::GameRules;

pub const CRAFT_XP_PER_ITEM: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct CraftReport {
    pub recipe: String,
    pub amount: u32,
    /// Inventory units produced; zero when the output is gear.
    pub units: u32,
    /// Gear instance ids produced; empty when the output is an inventory item.
    pub gear: Vec<String>,
    pub xp: XpAward,
}

/// Craft `amount` batches of a recipe the player has unlocked.
pub fn craft(
    player: &mut PlayerRecord,
    recipe_key: &str,
    amount: u32,
    content: &ContentTables,
    rules: &GameRules,
    now: DateTime<Utc>,
) -> Result<CraftReport, GameError> {
    if amount == 0 {
        return Err(GameError::Precondition("Craft at least one.".to_string()));
    }
    regenerate_stamina(&mut player.general, now, rules.stamina_regen_secs);
    if player.general.stamina == 0 {
        return Err(GameError::NoStamina);
    }
    let recipe = content.recipe(recipe_key)?;
    if !player.recipes.contains(recipe_key) {
        return Err(GameError::Precondition(format!(
            "You haven't unlocked the {} recipe.",
            recipe_key
        )));
    }
    let missing: Vec<String> = recipe
        .ingredients
        .iter()
        .filter_map(|(item, per)| {
            let need = per * amount;
            let have = player.inventory.count(item);
            (have < need).then(|| format!("{} {}/{}", item, have, need))
        })
        .collect();
    if !missing.is_empty() {
        return Err(GameError::Precondition(format!(
            "Not enough resources to craft {} x {}: {}.",
            amount,
            recipe_key,
            missing.join(", ")
        )));
    }
    for (item, per) in &recipe.ingredients {
        remove_items(&mut player.inventory, item, per * amount)?;
    }

    let mut report = CraftReport {
        recipe: recipe_key.to_string(),
        amount,
        units: 0,
        gear: Vec::new(),
        xp: XpAward { xp: 0, level: 0, leveled_up: false, levels_gained: 0 },
    };
    if content.template(recipe_key).is_some() {
        for _ in 0..amount {
            report.gear.push(grant_gear(player, recipe_key));
        }
    } else {
        report.units = recipe.output_qty * amount;
        add_items(&mut player.inventory, recipe_key, report.units);
    }
    report.xp = award_player_xp(player, Skill::Crafting, amount * CRAFT_XP_PER_ITEM);
    info!("player {} crafted {} x {}", player.id, amount, recipe_key);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (PlayerRecord, ContentTables) {
        (
            PlayerRecord::new(41, "Aria", "plains", "pond"),
            ContentTables::builtin().expect("content"),
        )
    }

    #[test]
    fn crafting_gear_mints_instances_and_consumes_exactly() {
        let (mut player, content) = setup();
        let recipe = content.recipe("tool_rod").expect("recipe").clone();
        for (item, per) in &recipe.ingredients {
            add_items(&mut player.inventory, item, per * 2 + 1);
        }
        let report = craft(&mut player, "tool_rod", 2, &content, &GameRules::default(), Utc::now())
            .expect("craft");
        assert_eq!(report.gear.len(), 2);
        assert_eq!(player.equipment.instances.len(), 2);
        for item in recipe.ingredients.keys() {
            assert_eq!(player.inventory.count(item), 1);
        }
        assert_eq!(player.skills.get(Skill::Crafting).xp, 0);
        assert_eq!(player.skills.get(Skill::Crafting).level, 1);
    }

    #[test]
    fn ingredients_that_hit_zero_are_removed() {
        let (mut player, content) = setup();
        player.recipes.insert("bread".into());
        let recipe = content.recipe("bread").expect("recipe").clone();
        for (item, per) in &recipe.ingredients {
            add_items(&mut player.inventory, item, *per);
        }
        let report = craft(&mut player, "bread", 1, &content, &GameRules::default(), Utc::now())
            .expect("craft");
        assert_eq!(report.units, recipe.output_qty);
        for item in recipe.ingredients.keys() {
            assert!(!player.inventory.items.contains_key(item));
        }
        assert_eq!(player.inventory.count("bread"), recipe.output_qty);
    }

    #[test]
    fn locked_unknown_or_unaffordable_recipes_are_rejected() {
        let (mut player, content) = setup();
        let rules = GameRules::default();
        assert!(matches!(
            craft(&mut player, "moon_cake", 1, &content, &rules, Utc::now()),
            Err(GameError::MissingContent(_))
        ));
        assert!(craft(&mut player, "iron_sword", 1, &content, &rules, Utc::now()).is_err());
        let before = player.clone();
        let err = craft(&mut player, "tool_rod", 1, &content, &rules, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("Not enough"));
        assert_eq!(player.inventory, before.inventory);
    }
}
