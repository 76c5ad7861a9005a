//! Player progression state
//!
//! A player owns a factory of four upgradeable stations and a progress record.
//! Everything here is plain data; locking lives in `game::registry`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::constants::{progress, station};

/// Opaque player identifier, caller-supplied or server-generated
pub type PlayerId = String;

/// Generate a fresh player identifier
pub fn generate_player_id() -> PlayerId {
    uuid::Uuid::new_v4().simple().to_string()
}

/// The four factory stations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationKind {
    Hp,
    Armor,
    Attack,
    Loot,
}

impl StationKind {
    pub const ALL: [StationKind; 4] = [
        StationKind::Hp,
        StationKind::Armor,
        StationKind::Attack,
        StationKind::Loot,
    ];

    /// Wire name of the station
    pub fn as_str(&self) -> &'static str {
        match self {
            StationKind::Hp => "hp",
            StationKind::Armor => "armor",
            StationKind::Attack => "attack",
            StationKind::Loot => "loot",
        }
    }
}

impl fmt::Display for StationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A station key that is not one of hp, armor, attack, loot
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown station: {0:?}")]
pub struct UnknownStation(pub String);

impl FromStr for StationKind {
    type Err = UnknownStation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hp" => Ok(StationKind::Hp),
            "armor" => Ok(StationKind::Armor),
            "attack" => Ok(StationKind::Attack),
            "loot" => Ok(StationKind::Loot),
            other => Err(UnknownStation(other.to_string())),
        }
    }
}

/// One upgradeable multiplier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub level: u32,
    pub multiplier: f64,
    /// Gold required for the next upgrade
    pub cost: u64,
}

impl Default for Station {
    fn default() -> Self {
        Self {
            level: station::STARTING_LEVEL,
            multiplier: station::STARTING_MULTIPLIER,
            cost: station::STARTING_COST,
        }
    }
}

/// The four stations that shape a player's hero
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Factory {
    pub hp_station: Station,
    pub armor_station: Station,
    pub attack_station: Station,
    pub loot_station: Station,
}

impl Factory {
    pub fn station(&self, kind: StationKind) -> &Station {
        match kind {
            StationKind::Hp => &self.hp_station,
            StationKind::Armor => &self.armor_station,
            StationKind::Attack => &self.attack_station,
            StationKind::Loot => &self.loot_station,
        }
    }

    pub fn station_mut(&mut self, kind: StationKind) -> &mut Station {
        match kind {
            StationKind::Hp => &mut self.hp_station,
            StationKind::Armor => &mut self.armor_station,
            StationKind::Attack => &mut self.attack_station,
            StationKind::Loot => &mut self.loot_station,
        }
    }
}

/// Dungeon progression. `dungeon_level` never decreases and gold never goes negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub dungeon_level: u32,
    pub gold: u64,
    pub experience: u64,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            dungeon_level: progress::STARTING_DUNGEON_LEVEL,
            gold: 0,
            experience: 0,
        }
    }
}

/// Full per-player state, as stored in the registry and sent to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub id: PlayerId,
    pub name: String,
    pub factory: Factory,
    pub progress: Progress,
    pub last_seen: DateTime<Utc>,
}

impl PlayerState {
    pub fn new(id: PlayerId) -> Self {
        let name = default_name(&id);
        Self {
            id,
            name,
            factory: Factory::default(),
            progress: Progress::default(),
            last_seen: Utc::now(),
        }
    }

    /// Mark the player as seen now
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}

fn default_name(id: &str) -> String {
    let short: String = id.chars().take(8).collect();
    format!("Hero-{}", short)
}
