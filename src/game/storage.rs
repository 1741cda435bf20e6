use std::path::{Path, PathBuf};

use log::info;
use sled::IVec;

use crate::game::errors::GameError;
use crate::game::types::{PlayerId, PlayerRecord, PLAYER_SCHEMA_VERSION};

const TREE_PLAYERS: &str = "starfall_players";
const PLAYER_PREFIX: &str = "players:";

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct GameStoreBuilder {
    path: PathBuf,
    clear_stale_flags: bool,
}

impl GameStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            clear_stale_flags: false,
        }
    }

    /// Clear `in_dungeon` flags left behind by an unclean shutdown while opening.
    pub fn clear_stale_flags(mut self) -> Self {
        self.clear_stale_flags = true;
        self
    }

    pub fn open(self) -> Result<GameStore, GameError> {
        let store = GameStore::open(self.path)?;
        if self.clear_stale_flags {
            store.clear_encounter_flags()?;
        }
        Ok(store)
    }
}

/// Sled-backed persistence for player records.
///
/// Writes are read-modify-write and not transactional; callers serialise
/// access per player (see `EncounterRegistry`).
pub struct GameStore {
    _db: sled::Db,
    players: sled::Tree,
}

impl GameStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GameError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let players = db.open_tree(TREE_PLAYERS)?;
        Ok(Self { _db: db, players })
    }

    fn players_key(id: PlayerId) -> Vec<u8> {
        format!("{}{}", PLAYER_PREFIX, id).into_bytes()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, GameError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: IVec) -> Result<T, GameError> {
        Ok(bincode::deserialize::<T>(&bytes)?)
    }

    /// Create a new player record. Fails if the id is already registered.
    pub fn insert_player(&self, player: PlayerRecord) -> Result<(), GameError> {
        if self.players.contains_key(Self::players_key(player.id))? {
            return Err(GameError::AlreadyRegistered);
        }
        self.put_player(player)
    }

    /// Insert or update a player record.
    pub fn put_player(&self, mut player: PlayerRecord) -> Result<(), GameError> {
        player.schema_version = PLAYER_SCHEMA_VERSION;
        player.touch();
        let key = Self::players_key(player.id);
        let bytes = Self::serialize(&player)?;
        self.players.insert(key, bytes)?;
        self.players.flush()?;
        Ok(())
    }

    /// Fetch a player record, or `None` when the id has never registered.
    pub fn find_player(&self, id: PlayerId) -> Result<Option<PlayerRecord>, GameError> {
        let Some(bytes) = self.players.get(Self::players_key(id))? else {
            return Ok(None);
        };
        let record: PlayerRecord = Self::deserialize(bytes)?;
        if record.schema_version != PLAYER_SCHEMA_VERSION {
            return Err(GameError::SchemaMismatch {
                entity: "player",
                expected: PLAYER_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(Some(record))
    }

    /// Fetch a player record; unregistered ids are a precondition failure.
    pub fn get_player(&self, id: PlayerId) -> Result<PlayerRecord, GameError> {
        self.find_player(id)?.ok_or(GameError::NotRegistered)
    }

    /// Load, mutate and write back one player record.
    ///
    /// The record is only written when `apply` succeeds, so a rejected action leaves
    /// the stored record untouched.
    pub fn update_player<T, F>(&self, id: PlayerId, apply: F) -> Result<T, GameError>
    where
        F: FnOnce(&mut PlayerRecord) -> Result<T, GameError>,
    {
        let mut player = self.get_player(id)?;
        let out = apply(&mut player)?;
        self.put_player(player)?;
        Ok(out)
    }

    pub fn list_player_ids(&self) -> Result<Vec<PlayerId>, GameError> {
        let mut ids = Vec::new();
        for entry in self.players.scan_prefix(PLAYER_PREFIX.as_bytes()) {
            let (key, _) = entry?;
            let text = String::from_utf8_lossy(&key);
            if let Some(id) = text
                .strip_prefix(PLAYER_PREFIX)
                .and_then(|raw| raw.parse::<PlayerId>().ok())
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    pub fn player_count(&self) -> Result<usize, GameError> {
        Ok(self.players.scan_prefix(PLAYER_PREFIX.as_bytes()).count())
    }

    /// Startup recovery: no encounter survives a restart, so any `in_dungeon` flag is stale.
    pub fn clear_encounter_flags(&self) -> Result<usize, GameError> {
        let mut cleared = 0;
        for id in self.list_player_ids()? {
            let mut player = self.get_player(id)?;
            if player.general.in_dungeon {
                player.general.in_dungeon = false;
                self.put_player(player)?;
                cleared += 1;
            }
        }
        if cleared > 0 {
            info!("cleared {} stale dungeon flag(s)", cleared);
        }
        Ok(cleared)
    }
}
