use thiserror::Error;

/// Errors that can arise while running Starfall game logic or touching the record store.
#[derive(Debug, Error)]
pub enum GameError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Content tables are JSON; a malformed file surfaces here.
    #[error("content parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around IO errors (directory creation, content files, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The acting player has no record yet.
    #[error("not registered")]
    NotRegistered,

    #[error("already registered")]
    AlreadyRegistered,

    /// A hunt or dungeon run is already in progress for this player.
    #[error("already in an encounter")]
    AlreadyInEncounter,

    #[error("out of stamina")]
    NoStamina,

    /// A mob, floor, item or recipe referenced by the game is absent from the content tables.
    #[error("missing content: {0}")]
    MissingContent(String),

    /// Someone tried to act on an encounter that belongs to another player.
    #[error("not your encounter")]
    Unauthorized,

    #[error("no active encounter")]
    NoActiveEncounter,

    /// The previous action for this player is still being resolved.
    #[error("action already in flight")]
    ActionInFlight,

    /// A gameplay rule rejected the request (missing tool, bad slot, not enough materials...).
    #[error("{0}")]
    Precondition(String),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },
}

impl GameError {
    /// True for errors that are expected rejections rather than faults in storage or content.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            GameError::NotRegistered
                | GameError::AlreadyRegistered
                | GameError::AlreadyInEncounter
                | GameError::NoStamina
                | GameError::Unauthorized
                | GameError::NoActiveEncounter
                | GameError::ActionInFlight
                | GameError::Precondition(_)
                | GameError::NotFound(_)
        )
    }
}
