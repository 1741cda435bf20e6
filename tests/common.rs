//! Shared fixtures for the integration tests: throwaway stores, the shipped
//! content tables and hand-built mob templates.

use std::sync::Arc;

use starfall::game::content::{LootEntry, MobStats, MobTemplate};
use starfall::game::{CommandProcessor, ContentTables, GameRules, GameStore, PlayerId};
use tempfile::TempDir;

pub fn content() -> ContentTables {
    ContentTables::builtin().expect("builtin content")
}

/// A processor over a fresh sled store in a temp dir. Keep the `TempDir` alive.
#[allow(dead_code)]
pub fn open_processor(seed: u64) -> (TempDir, CommandProcessor) {
    let dir = TempDir::new().expect("tempdir");
    let store = GameStore::open(dir.path().join("db")).expect("store");
    let processor = CommandProcessor::new(
        Arc::new(store),
        Arc::new(content()),
        GameRules::default(),
    )
    .with_seed(seed);
    (dir, processor)
}

/// Register `id` and raise its attack stats so fights end quickly.
#[allow(dead_code)]
pub fn register_strong(processor: &CommandProcessor, id: PlayerId, name: &str) {
    let reply = processor.handle(id, &format!("register {}", name));
    assert!(reply.contains("Welcome"), "{}", reply);
    processor
        .store()
        .update_player(id, |p| {
            p.general.strength = 500;
            p.general.accuracy = 500;
            Ok(())
        })
        .expect("buff");
}

#[allow(dead_code)]
pub fn goblin() -> MobTemplate {
    MobTemplate {
        name: "Goblin".into(),
        stats: MobStats { hp: 30, strength: 8, defense: 4, evasion: 5, accuracy: 5 },
        behavior: Default::default(),
        xp: 50,
        gold: [10, 20],
        loot_table: vec![LootEntry { item: "bone".into(), chance: 1.0, quantity: [1, 1] }],
        special_attacks: Vec::new(),
    }
}
