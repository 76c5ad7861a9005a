//! Battle resolution
//!
//! Pure functions: derive a hero from a factory, fight one dungeon enemy,
//! fold the outcome into a progress record. No randomness, so identical
//! inputs always produce identical outcomes.

use serde::{Deserialize, Serialize};

use crate::game::constants::{enemy, hero, reward};
use crate::game::state::{Factory, PlayerState, Progress};

/// Hero stats derived from a factory. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hero {
    pub hp: i64,
    pub armor: i64,
    pub attack: i64,
    pub loot: i64,
}

/// Result of a single battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleOutcome {
    pub victory: bool,
    pub gold_reward: u64,
    pub exp_reward: u64,
}

/// Dungeon enemy for a given level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enemy {
    pub hp: i64,
    pub attack: i64,
}

impl Enemy {
    pub fn for_level(dungeon_level: u32) -> Self {
        let level = i64::from(dungeon_level);
        Self {
            hp: enemy::BASE_HP + enemy::HP_PER_LEVEL * level,
            attack: enemy::BASE_ATTACK + enemy::ATTACK_PER_LEVEL * level,
        }
    }
}

fn scale(base: i64, multiplier: f64) -> i64 {
    // Truncation toward zero equals floor for the non-negative values used here
    (base as f64 * multiplier) as i64
}

/// Compute hero stats from the factory's current multipliers
pub fn derive_hero(factory: &Factory) -> Hero {
    Hero {
        hp: scale(hero::BASE_HP, factory.hp_station.multiplier),
        armor: scale(hero::BASE_ARMOR, factory.armor_station.multiplier),
        attack: scale(hero::BASE_ATTACK, factory.attack_station.multiplier),
        loot: scale(hero::BASE_LOOT, factory.loot_station.multiplier),
    }
}

/// Fight one enemy of `dungeon_level`.
///
/// Damage per exchange is fixed for the whole battle. The hero strikes first
/// each round; a killing strike ends the battle before the enemy answers.
/// Rewards are computed whether or not the hero wins.
pub fn resolve_battle(hero: &Hero, dungeon_level: u32) -> BattleOutcome {
    let enemy = Enemy::for_level(dungeon_level);

    let hero_damage = (hero.attack - enemy.attack / 2).max(hero::MIN_DAMAGE);
    let enemy_damage = (enemy.attack - hero.armor).max(hero::MIN_DAMAGE);

    let mut hero_hp = hero.hp;
    let mut enemy_hp = enemy.hp;

    while hero_hp > 0 && enemy_hp > 0 {
        enemy_hp -= hero_damage;
        if enemy_hp <= 0 {
            break;
        }
        hero_hp -= enemy_damage;
    }

    let level = i64::from(dungeon_level);
    let gold = (reward::BASE_GOLD + reward::GOLD_PER_LEVEL * level) * hero.loot;
    let exp = reward::BASE_EXP + level;

    BattleOutcome {
        victory: hero_hp > 0,
        gold_reward: u64::try_from(gold).unwrap_or(0),
        exp_reward: u64::try_from(exp).unwrap_or(0),
    }
}

/// Fold a battle outcome into progress.
///
/// Victory advances the dungeon level and pays full rewards; defeat pays
/// half the gold and nothing else.
pub fn apply_outcome(progress: &mut Progress, outcome: &BattleOutcome) {
    if outcome.victory {
        progress.dungeon_level = progress.dungeon_level.saturating_add(1);
        progress.gold = progress.gold.saturating_add(outcome.gold_reward);
        progress.experience = progress.experience.saturating_add(outcome.exp_reward);
    } else {
        progress.gold = progress
            .gold
            .saturating_add(outcome.gold_reward / reward::DEFEAT_GOLD_DIVISOR);
    }
}

/// Run one full battle for a player: derive, resolve, apply.
///
/// Callers must hold the player's lock for the whole call.
pub fn run_battle(player: &mut PlayerState) -> BattleOutcome {
    let hero = derive_hero(&player.factory);
    let outcome = resolve_battle(&hero, player.progress.dungeon_level);
    apply_outcome(&mut player.progress, &outcome);
    outcome
}
