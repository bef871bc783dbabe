use std::str::FromStr;

use crate::game::constants::{ai, physics, world};

/// Invalid configuration detected by [`SimConfig::validate`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("world size must be positive and finite, got {width}x{height}")]
    WorldSize { width: f32, height: f32 },
    #[error("tick_rate must be 1-1000, got {0}")]
    TickRate(u32),
    #[error("bot_difficulty must be {min}-{max}, got {value}")]
    Difficulty { value: u8, min: u8, max: u8 },
    #[error("{name} must be non-negative and finite, got {value}")]
    SpawnRate { name: &'static str, value: f32 },
}

/// Population targets and replenish rates
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnConfig {
    pub food_count: usize,
    pub virus_count: usize,
    pub power_up_count: usize,
    /// Pellets per second while below target
    pub food_spawn_rate: f32,
    /// Power-ups per second while below target
    pub power_up_spawn_rate: f32,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            food_count: world::DEFAULT_FOOD_COUNT,
            virus_count: world::DEFAULT_VIRUS_COUNT,
            power_up_count: world::DEFAULT_POWER_UP_COUNT,
            food_spawn_rate: world::FOOD_SPAWN_RATE,
            power_up_spawn_rate: world::POWER_UP_SPAWN_RATE,
        }
    }
}

/// Simulation configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub world_width: f32,
    pub world_height: f32,
    pub spawn: SpawnConfig,
    /// AI players kept in the arena
    pub bot_count: usize,
    pub bot_difficulty: u8,
    /// Ticks per second for the headless driver
    pub tick_rate: u32,
    /// RNG seed; equal seeds replay identically
    pub seed: u64,
    /// Stop after this many ticks (run forever when `None`)
    pub max_ticks: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            world_width: world::DEFAULT_WIDTH,
            world_height: world::DEFAULT_HEIGHT,
            spawn: SpawnConfig::default(),
            bot_count: ai::COUNT,
            bot_difficulty: 3,
            tick_rate: physics::TICK_RATE,
            seed: 0x5EED,
            max_ticks: None,
        }
    }
}

/// Parse `name` from the environment, keeping the default (with a warning)
/// when it does not parse or fails `accept`
fn env_override<T: FromStr>(name: &str, accept: impl Fn(&T) -> bool, expected: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(parsed) if accept(&parsed) => Some(parsed),
        Ok(_) => {
            tracing::warn!("{} must be {}, using default", name, expected);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

impl SimConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        let size_ok = |v: &f32| v.is_finite() && *v >= 500.0 && *v <= 100_000.0;
        if let Some(width) = env_override("WORLD_WIDTH", size_ok, "500-100000") {
            config.world_width = width;
        }
        if let Some(height) = env_override("WORLD_HEIGHT", size_ok, "500-100000") {
            config.world_height = height;
        }

        if let Some(count) = env_override("FOOD_COUNT", |v: &usize| *v <= 100_000, "0-100000") {
            config.spawn.food_count = count;
        }
        if let Some(count) = env_override("VIRUS_COUNT", |v: &usize| *v <= 1_000, "0-1000") {
            config.spawn.virus_count = count;
        }
        if let Some(count) = env_override("POWER_UP_COUNT", |v: &usize| *v <= 1_000, "0-1000") {
            config.spawn.power_up_count = count;
        }
        if let Some(count) = env_override("BOT_COUNT", |v: &usize| *v <= 500, "0-500") {
            config.bot_count = count;
        }
        if let Some(difficulty) = env_override(
            "BOT_DIFFICULTY",
            |v: &u8| (ai::MIN_DIFFICULTY..=ai::MAX_DIFFICULTY).contains(v),
            "1-5",
        ) {
            config.bot_difficulty = difficulty;
        }
        if let Some(rate) = env_override("TICK_RATE", |v: &u32| (1..=1000).contains(v), "1-1000") {
            config.tick_rate = rate;
        }
        if let Some(seed) = env_override("SIM_SEED", |_: &u64| true, "a u64") {
            config.seed = seed;
        }
        if let Some(max) = env_override("MAX_TICKS", |v: &u64| *v > 0, "> 0") {
            config.max_ticks = Some(max);
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !positive(self.world_width) || !positive(self.world_height) {
            return Err(ConfigError::WorldSize {
                width: self.world_width,
                height: self.world_height,
            });
        }
        if !(1..=1000).contains(&self.tick_rate) {
            return Err(ConfigError::TickRate(self.tick_rate));
        }
        if !(ai::MIN_DIFFICULTY..=ai::MAX_DIFFICULTY).contains(&self.bot_difficulty) {
            return Err(ConfigError::Difficulty {
                value: self.bot_difficulty,
                min: ai::MIN_DIFFICULTY,
                max: ai::MAX_DIFFICULTY,
            });
        }
        for (name, value) in [
            ("food_spawn_rate", self.spawn.food_spawn_rate),
            ("power_up_spawn_rate", self.spawn.power_up_spawn_rate),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::SpawnRate { name, value });
            }
        }
        Ok(())
    }

    /// Seconds per tick at the configured rate
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.world_width, world::DEFAULT_WIDTH);
        assert_eq!(config.bot_count, ai::COUNT);
        assert_eq!(config.tick_rate, 60);
        assert!(config.max_ticks.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = SimConfig::load_or_default();
        assert!(config.tick_rate > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_world() {
        let config = SimConfig {
            world_width: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::WorldSize { .. })));
    }

    #[test]
    fn test_validate_rejects_difficulty() {
        let config = SimConfig {
            bot_difficulty: 9,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Difficulty { value: 9, min: 1, max: 5 })
        );
    }

    #[test]
    fn test_validate_rejects_negative_rate() {
        let mut config = SimConfig::default();
        config.spawn.food_spawn_rate = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SpawnRate { name: "food_spawn_rate", .. })
        ));
    }

    #[test]
    fn test_tick_dt() {
        let config = SimConfig {
            tick_rate: 50,
            ..Default::default()
        };
        assert!((config.tick_dt() - 0.02).abs() < 1e-6);
    }
}
