//! Active encounter bookkeeping: at most one hunt or dungeon run per player,
//! one in-flight action per player, and idle-timeout detection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::game::combat::Outcome;
use crate::game::dungeon::DungeonRun;
use crate::game::errors::GameError;
use crate::game::hunt::Hunt;
use crate::game::types::PlayerId;

#[derive(Debug, Clone, PartialEq)]
pub enum Encounter {
    Hunt(Hunt),
    Dungeon(DungeonRun),
}

impl Encounter {
    pub fn is_over(&self) -> bool {
        match self {
            Encounter::Hunt(hunt) => hunt.is_over(),
            Encounter::Dungeon(run) => run.is_over(),
        }
    }

    /// Resolve an idle encounter as a forced flee.
    pub fn into_timed_out(self) -> Encounter {
        match self {
            Encounter::Hunt(mut hunt) => {
                if hunt.combat.outcome.is_none() {
                    hunt.combat.outcome = Some(Outcome::Fled);
                    hunt.log.push("You hesitate too long and the creature slips away.".to_string());
                }
                Encounter::Hunt(hunt)
            }
            Encounter::Dungeon(mut run) => {
                run.time_out();
                Encounter::Dungeon(run)
            }
        }
    }
}

#[derive(Debug)]
pub struct EncounterSlot {
    encounter: Option<Encounter>,
    last_activity: Instant,
}

impl EncounterSlot {
    fn new() -> Self {
        Self {
            encounter: None,
            last_activity: Instant::now(),
        }
    }
}

/// Exclusive access to one player's encounter slot for the duration of an action.
pub struct ActionLock {
    player: PlayerId,
    guard: OwnedMutexGuard<EncounterSlot>,
}

impl ActionLock {
    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn encounter(&self) -> Option<&Encounter> {
        self.guard.encounter.as_ref()
    }

    pub fn take(&mut self) -> Option<Encounter> {
        self.guard.encounter.take()
    }

    /// Store an encounter and reset its idle clock.
    pub fn put(&mut self, encounter: Encounter, now: Instant) {
        self.guard.encounter = Some(encounter);
        self.guard.last_activity = now;
    }

    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        self.guard.encounter.is_some()
            && now.saturating_duration_since(self.guard.last_activity) > timeout
    }
}

/// Per-player encounter slots, each behind its own async mutex.
///
/// A second action arriving while the first is still being resolved is rejected
/// with `ActionInFlight` instead of queued.
pub struct EncounterRegistry {
    slots: Mutex<HashMap<PlayerId, Arc<AsyncMutex<EncounterSlot>>>>,
    timeout: Duration,
}

impl EncounterRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn slot(&self, player: PlayerId) -> Arc<AsyncMutex<EncounterSlot>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(player)
            .or_insert_with(|| Arc::new(AsyncMutex::new(EncounterSlot::new())))
            .clone()
    }

    /// Take the player's action lock without waiting.
    pub fn begin(&self, player: PlayerId) -> Result<ActionLock, GameError> {
        let guard = self
            .slot(player)
            .try_lock_owned()
            .map_err(|_| GameError::ActionInFlight)?;
        Ok(ActionLock { player, guard })
    }

    /// Lock `owner`'s encounter on behalf of `actor`.
    pub fn act(&self, actor: PlayerId, owner: PlayerId) -> Result<ActionLock, GameError> {
        if actor != owner {
            return Err(GameError::Unauthorized);
        }
        let lock = self.begin(owner)?;
        if lock.encounter().is_none() {
            return Err(GameError::NoActiveEncounter);
        }
        Ok(lock)
    }

    pub fn has_encounter(&self, player: PlayerId) -> bool {
        let slot = {
            let map = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            map.get(&player).cloned()
        };
        match slot {
            Some(slot) => match slot.try_lock() {
                Ok(slot) => slot.encounter.is_some(),
                Err(_) => true,
            },
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        let slots: Vec<_> = {
            let map = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            map.values().cloned().collect()
        };
        slots
            .iter()
            .filter(|slot| match slot.try_lock() {
                Ok(slot) => slot.encounter.is_some(),
                Err(_) => true,
            })
            .count()
    }

    /// Remove every encounter idle for longer than the timeout, resolved as timed out.
    ///
    /// Slots that are mid-action are skipped; they are checked again on the next sweep.
    /// Empty slots nobody holds are dropped from the map.
    pub fn expire_idle(&self, now: Instant) -> Vec<(PlayerId, Encounter)> {
        let slots: Vec<(PlayerId, Arc<AsyncMutex<EncounterSlot>>)> = {
            let map = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            map.iter().map(|(id, slot)| (*id, slot.clone())).collect()
        };
        let mut expired = Vec::new();
        for (player, slot) in slots {
            let Ok(guard) = slot.try_lock_owned() else {
                continue;
            };
            let mut lock = ActionLock { player, guard };
            if lock.is_idle(now, self.timeout) {
                if let Some(encounter) = lock.take() {
                    info!("player {} encounter timed out", player);
                    expired.push((player, encounter.into_timed_out()));
                }
            }
        }
        self.prune_empty();
        expired
    }

    /// Drop slots with no encounter and no outstanding handle.
    fn prune_empty(&self) {
        let mut map = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let before = map.len();
        map.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(slot) => slot.encounter.is_some(),
                Err(_) => true,
            }
        });
        if map.len() < before {
            debug!("dropped {} empty encounter slot(s)", before - map.len());
        }
    }

    fn slot_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
