//! # Starfall - a text RPG server
//!
//! Starfall is a line-oriented role-playing game: players gather resources,
//! craft gear, hunt creatures in the open world and delve dungeon floors room
//! by room. Every action is one request/response cycle against a persistent
//! player record.
//!
//! ## Features
//!
//! - **Combat Engine**: Pure round resolution with accuracy/evasion, defend stances,
//!   telegraphed special attacks and a focus meter for dungeon skills.
//! - **Progression**: Per-skill XP with multi-level rollover, combat level stat growth,
//!   collection tiers that unlock recipes, and regenerating stamina.
//! - **Encounters**: Hunts and dungeon runs held per player, one action in flight at a
//!   time, idle encounters resolved as a flee after the turn timeout.
//! - **Content Tables**: Mobs, areas, items, gear templates, sets, dungeon floors,
//!   recipes, collections and quests loaded from JSON.
//! - **Persistence**: Player records in an embedded sled database, bincode encoded.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use starfall::config::Config;
//! use starfall::game::{CommandProcessor, ContentTables, GameStoreBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let store = GameStoreBuilder::new(config.storage.db_path()).clear_stale_flags().open()?;
//!     let content = ContentTables::load_dir(&config.content.dir)?;
//!     let processor = CommandProcessor::new(Arc::new(store), Arc::new(content), config.game_rules());
//!     let processor = Arc::new(processor);
//!     let worker = Arc::clone(&processor);
//!     let reply = tokio::task::spawn_blocking(move || worker.handle(1, "register Aria")).await?;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`game`] - records, content, combat engine, encounters and the command surface
//! - [`config`] - configuration management and validation
//! - [`logutil`] - single-line log sanitising for player-supplied text

pub mod config;
pub mod game;
pub mod logutil;
