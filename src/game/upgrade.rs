//! Factory station upgrades

use crate::game::constants::station;
use crate::game::state::{Factory, Progress, StationKind, UnknownStation};

/// Why an upgrade was rejected. Rejections never mutate state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpgradeError {
    #[error(transparent)]
    UnknownStation(#[from] UnknownStation),
    #[error("Insufficient gold: need {cost}, have {gold}")]
    InsufficientGold { cost: u64, gold: u64 },
}

/// What a successful upgrade paid and produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpgradeReceipt {
    pub station: StationKind,
    pub paid: u64,
    pub new_level: u32,
    pub next_cost: u64,
}

/// Next upgrade cost from the current one (incremental, truncating)
pub fn next_cost(cost: u64) -> u64 {
    (cost as f64 * station::COST_GROWTH) as u64
}

/// Upgrade one station if the player can afford it.
///
/// On success gold drops by the current cost, the level goes up by one, the
/// multiplier by `MULTIPLIER_STEP` and the cost grows by `COST_GROWTH`.
/// Callers must hold the player's lock so the check and the mutation are
/// indivisible.
pub fn attempt_upgrade(
    factory: &mut Factory,
    progress: &mut Progress,
    kind: StationKind,
) -> Result<UpgradeReceipt, UpgradeError> {
    let station = factory.station_mut(kind);
    let cost = station.cost;

    if progress.gold < cost {
        return Err(UpgradeError::InsufficientGold {
            cost,
            gold: progress.gold,
        });
    }

    progress.gold -= cost;
    station.level += 1;
    station.multiplier += station::MULTIPLIER_STEP;
    station.cost = next_cost(cost);

    Ok(UpgradeReceipt {
        station: kind,
        paid: cost,
        new_level: station.level,
        next_cost: station.cost,
    })
}
