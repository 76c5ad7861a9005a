//! Player registry
//!
//! One readers-writer lock guards the id -> player map; each player sits behind
//! its own mutex so a tick battle and an upgrade on the same player serialize
//! while different players proceed independently. The map lock and a player
//! lock are never held at the same time.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::game::battle::{run_battle, BattleOutcome};
use crate::game::state::{PlayerId, PlayerState, StationKind};
use crate::game::upgrade::{attempt_upgrade, UpgradeError, UpgradeReceipt};

/// Shared handle to one player's state. Cloning shares the same record.
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    id: PlayerId,
    state: Arc<Mutex<PlayerState>>,
}

impl PlayerHandle {
    fn new(id: PlayerId) -> Self {
        let state = PlayerState::new(id.clone());
        Self {
            id,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Copy of the current state, taken under the player lock
    pub fn snapshot(&self) -> PlayerState {
        self.state.lock().clone()
    }

    /// Update the last-seen timestamp
    pub fn touch(&self) {
        self.state.lock().touch();
    }

    /// Run one battle for this player
    pub fn battle(&self) -> BattleOutcome {
        let mut guard = self.state.lock();
        run_battle(&mut guard)
    }

    /// Upgrade a station; check and mutation happen under one lock acquisition
    pub fn upgrade(&self, kind: StationKind) -> Result<UpgradeReceipt, UpgradeError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        attempt_upgrade(&mut state.factory, &mut state.progress, kind)
    }

    /// Upgrade a station named by its wire key. Unknown keys are rejected
    /// before the player lock is taken.
    pub fn upgrade_by_key(&self, key: &str) -> Result<UpgradeReceipt, UpgradeError> {
        let kind: StationKind = key.parse()?;
        self.upgrade(kind)
    }

    #[cfg(test)]
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut PlayerState) -> R) -> R {
        let mut guard = self.state.lock();
        f(&mut guard)
    }

    /// True if both handles point at the same record
    pub fn same_record(&self, other: &PlayerHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// Owns every player for the lifetime of the process
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: RwLock<HashMap<PlayerId, PlayerHandle>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the player for `id`, creating it with defaults if unseen.
    ///
    /// Creation is atomic: concurrent callers with the same unseen id all get
    /// the same record. Existing players have their last-seen time refreshed.
    pub fn get_or_create(&self, id: &str) -> PlayerHandle {
        let existing = self.players.read().get(id).cloned();
        if let Some(handle) = existing {
            handle.touch();
            return handle;
        }

        let mut created = false;
        let handle = {
            let mut players = self.players.write();
            players
                .entry(id.to_owned())
                .or_insert_with(|| {
                    created = true;
                    PlayerHandle::new(id.to_owned())
                })
                .clone()
        };

        if created {
            debug!("Created player {}", id);
        } else {
            // Lost the race to another creator
            handle.touch();
        }
        handle
    }

    /// Look up a player without creating it
    pub fn get(&self, id: &str) -> Option<PlayerHandle> {
        self.players.read().get(id).cloned()
    }

    /// Handles to every player at this instant
    pub fn handles(&self) -> Vec<PlayerHandle> {
        self.players.read().values().cloned().collect()
    }

    /// Copy of every player's state.
    ///
    /// The set of players is fixed under the map lock; each record is then
    /// copied under its own lock, so no copy is ever torn.
    pub fn snapshot_all(&self) -> HashMap<PlayerId, PlayerState> {
        self.handles()
            .into_iter()
            .map(|handle| (handle.id.clone(), handle.snapshot()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }
}
