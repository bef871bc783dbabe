//! Spawn policy
//! Keeps food, viruses and power-ups at their population targets and
//! releases queued virus spawns (replacements and split siblings)

use rand::Rng;

use crate::config::SpawnConfig;
use crate::game::constants::{power_up, virus, world as world_consts};
use crate::game::state::{PendingVirus, PowerUpType, World};
use crate::util::vec2::Vec2;

/// Fractional spawn accumulators
/// Handles sub-1 spawn rates per tick
#[derive(Debug, Clone, Default)]
pub struct SpawnState {
    food: f32,
    power_ups: f32,
}

impl SpawnState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Entities spawned during one update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnStats {
    pub food: u32,
    pub viruses: u32,
    pub power_ups: u32,
}

fn pellet_count(world: &World) -> usize {
    world.food.iter().filter(|f| !f.is_ejected()).count()
}

fn spawn_random_virus(world: &mut World, velocity: Vec2) {
    let position = world
        .bounds
        .random_point(&mut world.rng, virus::BASE_RADIUS + world_consts::SPAWN_MARGIN);
    spawn_virus(world, position, velocity);
}

fn spawn_virus(world: &mut World, position: Vec2, velocity: Vec2) {
    world.add_virus(position);
    if let Some(v) = world.viruses.last_mut() {
        v.velocity = velocity;
    }
}

fn spawn_random_power_up(world: &mut World) {
    let kind = PowerUpType::ALL[world.rng.gen_range(0..PowerUpType::ALL.len())];
    let position = world
        .bounds
        .random_point(&mut world.rng, power_up::RADIUS + world_consts::SPAWN_MARGIN);
    world.add_power_up(position, kind);
}

/// Fill every collection up to its target
/// Called once when the simulation starts
pub fn spawn_initial(world: &mut World, config: &SpawnConfig) -> SpawnStats {
    let mut stats = SpawnStats::default();

    while pellet_count(world) < config.food_count {
        world.add_random_food();
        stats.food += 1;
    }
    while world.viruses.len() < config.virus_count {
        spawn_random_virus(world, Vec2::ZERO);
        stats.viruses += 1;
    }
    while world.power_ups.len() < config.power_up_count {
        spawn_random_power_up(world);
        stats.power_ups += 1;
    }

    tracing::debug!(
        food = stats.food,
        viruses = stats.viruses,
        power_ups = stats.power_ups,
        "spawned initial entities"
    );
    stats
}

/// Count down queued viruses and spawn the ones that are due.
/// Replacements (no position) only fill the population back up to target;
/// split siblings always spawn.
fn release_pending_viruses(world: &mut World, config: &SpawnConfig, dt: f32) -> u32 {
    for pending in &mut world.pending_viruses {
        pending.delay -= dt;
    }

    let (due, waiting): (Vec<PendingVirus>, Vec<PendingVirus>) = world
        .pending_viruses
        .drain(..)
        .partition(|p| p.delay <= 0.0 || !p.delay.is_finite());
    world.pending_viruses = waiting;

    let mut spawned = 0;
    for pending in due {
        match pending.position.filter(|p| p.is_finite()) {
            Some(position) => {
                let position = world.bounds.clamp_circle(position, virus::BASE_RADIUS);
                let velocity = if pending.velocity.is_finite() {
                    pending.velocity
                } else {
                    Vec2::ZERO
                };
                spawn_virus(world, position, velocity);
                spawned += 1;
            }
            None if world.viruses.len() < config.virus_count => {
                spawn_random_virus(world, Vec2::ZERO);
                spawned += 1;
            }
            None => {}
        }
    }
    spawned
}

/// Update spawning: release due viruses, then accumulate spawn rates and
/// spawn when ready, never exceeding the targets
pub fn update(world: &mut World, config: &SpawnConfig, spawn_state: &mut SpawnState, dt: f32) -> SpawnStats {
    let mut stats = SpawnStats {
        viruses: release_pending_viruses(world, config, dt),
        ..Default::default()
    };

    // Top up viruses not covered by a queued replacement
    let queued = world
        .pending_viruses
        .iter()
        .filter(|p| p.position.is_none())
        .count();
    while world.viruses.len() + queued < config.virus_count {
        spawn_random_virus(world, Vec2::ZERO);
        stats.viruses += 1;
    }

    let mut pellets = pellet_count(world);
    if pellets < config.food_count {
        spawn_state.food += config.food_spawn_rate * dt;
        while spawn_state.food >= 1.0 && pellets < config.food_count {
            world.add_random_food();
            spawn_state.food -= 1.0;
            pellets += 1;
            stats.food += 1;
        }
    } else {
        spawn_state.food = 0.0;
    }

    if world.power_ups.len() < config.power_up_count {
        spawn_state.power_ups += config.power_up_spawn_rate * dt;
        while spawn_state.power_ups >= 1.0 && world.power_ups.len() < config.power_up_count {
            spawn_random_power_up(world);
            spawn_state.power_ups -= 1.0;
            stats.power_ups += 1;
        }
    } else {
        spawn_state.power_ups = 0.0;
    }

    if stats != SpawnStats::default() {
        tracing::trace!(
            food = stats.food,
            viruses = stats.viruses,
            power_ups = stats.power_ups,
            "replenished entities"
        );
    }
    stats
}
