use std::collections::BTreeMap;

use crate::game::errors::GameError;
use crate::game::types::{Inventory, PlayerRecord};

pub fn add_items(inventory: &mut Inventory, item: &str, qty: u32) {
    if qty == 0 {
        return;
    }
    *inventory.items.entry(item.to_string()).or_insert(0) += qty;
}

/// Remove `qty` units; counters that reach zero are dropped.
pub fn remove_items(inventory: &mut Inventory, item: &str, qty: u32) -> Result<(), GameError> {
    let have = inventory.count(item);
    if have < qty {
        return Err(GameError::Precondition(format!(
            "Not enough {} (have {}, need {}).",
            item, have, qty
        )));
    }
    if have == qty {
        inventory.items.remove(item);
    } else {
        inventory.items.insert(item.to_string(), have - qty);
    }
    Ok(())
}

/// Add every loot entry to the player's inventory.
pub fn apply_loot(player: &mut PlayerRecord, loot: &BTreeMap<String, u32>) {
    for (item, qty) in loot {
        add_items(&mut player.inventory, item, *qty);
    }
}

/// Units the player can still carry before hitting `max_inventory`.
pub fn space_left(player: &PlayerRecord) -> u64 {
    (player.general.max_inventory as u64).saturating_sub(player.inventory.total_units())
}

/// `item xN, item xM` or `nothing`.
pub fn describe_items(items: &BTreeMap<String, u32>) -> String {
    if items.is_empty() {
        return "nothing".to_string();
    }
    items
        .iter()
        .map(|(item, qty)| format!("{} x{}", item, qty))
        .collect::<Vec<_>>()
        .join(", ")
}
