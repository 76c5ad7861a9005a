/// Hero base stats, scaled by the matching station multiplier
pub mod hero {
    /// Base hit points
    pub const BASE_HP: i64 = 100;
    /// Base armor (subtracted from enemy damage)
    pub const BASE_ARMOR: i64 = 10;
    /// Base attack
    pub const BASE_ATTACK: i64 = 20;
    /// Base loot factor (multiplies gold rewards)
    pub const BASE_LOOT: i64 = 1;
    /// Minimum damage dealt by either side per exchange
    pub const MIN_DAMAGE: i64 = 1;
}

/// Dungeon enemy scaling: stat = BASE + PER_LEVEL * dungeon_level
pub mod enemy {
    pub const BASE_HP: i64 = 50;
    pub const HP_PER_LEVEL: i64 = 10;
    pub const BASE_ATTACK: i64 = 15;
    pub const ATTACK_PER_LEVEL: i64 = 5;
}

/// Battle rewards
pub mod reward {
    /// Gold = (BASE_GOLD + GOLD_PER_LEVEL * level) * loot
    pub const BASE_GOLD: i64 = 10;
    pub const GOLD_PER_LEVEL: i64 = 2;
    /// Experience = BASE_EXP + level
    pub const BASE_EXP: i64 = 5;
    /// Defeat pays gold_reward / DEFEAT_GOLD_DIVISOR
    pub const DEFEAT_GOLD_DIVISOR: u64 = 2;
}

/// Factory station economy
pub mod station {
    pub const STARTING_LEVEL: u32 = 1;
    pub const STARTING_MULTIPLIER: f64 = 1.0;
    pub const STARTING_COST: u64 = 100;
    /// Added to the multiplier on every upgrade
    pub const MULTIPLIER_STEP: f64 = 0.2;
    /// Next cost = previous cost * COST_GROWTH, truncated
    pub const COST_GROWTH: f64 = 1.5;
}

/// Tick scheduling
pub mod tick {
    /// Default tick interval in milliseconds
    pub const DEFAULT_INTERVAL_MS: u64 = 1000;
    /// Log a summary every N ticks
    pub const SUMMARY_EVERY: u64 = 30;
}

/// Progression defaults for a fresh player
pub mod progress {
    pub const STARTING_DUNGEON_LEVEL: u32 = 1;
}
