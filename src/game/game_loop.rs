//! Fixed per-tick simulation pipeline
//!
//! physics → lifecycle → collisions → AI → bounds → spawn → scores → events

use serde::Serialize;
use tracing::trace;

use crate::config::SimConfig;
use crate::game::constants::physics::{DEFAULT_DT, MAX_TICK_DT};
use crate::game::events::{EventBus, GameEvent};
use crate::game::state::{Bounds, PlayerId, World};
use crate::game::systems::ai::{generate_bot_name, AiManager, Personality};
use crate::game::systems::collision::CollisionResolver;
use crate::game::systems::lifecycle::{self, CommandRejected};
use crate::game::systems::spawn::{self, SpawnState};
use crate::game::systems::physics;
use crate::util::vec2::Vec2;

/// Clamp a tick delta into `(0, MAX_TICK_DT]`; NaN, infinite or
/// non-positive input becomes 1/60
#[inline]
pub fn sanitize_tick_dt(dt: f32) -> f32 {
    if dt.is_finite() && dt > 0.0 {
        dt.min(MAX_TICK_DT)
    } else {
        DEFAULT_DT
    }
}

/// Counters and events produced by one tick
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub dt: f32,
    pub food_eaten: u32,
    pub cells_eaten: u32,
    pub merges: u32,
    pub splits: u32,
    pub ejects: u32,
    pub viruses_popped: u32,
    pub power_ups_collected: u32,
    pub eliminations: u32,
    pub entities_dropped: u32,
    pub ai_fallbacks: u32,
    pub food_spawned: u32,
    pub viruses_spawned: u32,
    pub power_ups_spawned: u32,
    pub events: Vec<GameEvent>,
}

/// The world plus every system that advances it
#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
    world: World,
    ai: AiManager,
    events: EventBus,
    collisions: CollisionResolver,
    spawn_state: SpawnState,
    /// Human commands accepted since the last tick
    command_splits: u32,
    command_ejects: u32,
}

impl Simulation {
    /// Build a world from `config` and fill it to its population targets.
    /// Bots are added separately (see [`fill_with_bots`](Self::fill_with_bots)).
    pub fn new(config: SimConfig) -> Self {
        let mut world = World::new(Bounds::new(config.world_width, config.world_height), config.seed);
        spawn::spawn_initial(&mut world, &config.spawn);

        Self {
            config,
            world,
            ai: AiManager::new(),
            events: EventBus::new(),
            collisions: CollisionResolver::new(),
            spawn_state: SpawnState::new(),
            command_splits: 0,
            command_ejects: 0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn ai(&self) -> &AiManager {
        &self.ai
    }

    /// Register event subscribers here
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn add_human(&mut self, name: impl Into<String>) -> PlayerId {
        self.world.spawn_player(name, false)
    }

    /// Add a bot with a random personality at the configured difficulty
    pub fn add_bot(&mut self) -> PlayerId {
        let personality = Personality::random(&mut self.world.rng);
        self.add_bot_with(personality, self.config.bot_difficulty)
    }

    pub fn add_bot_with(&mut self, personality: Personality, difficulty: u8) -> PlayerId {
        let name = generate_bot_name(&mut self.world.rng);
        let id = self.world.spawn_player(name, true);
        self.ai.register_bot(id, personality, difficulty);
        id
    }

    pub fn fill_with_bots(&mut self, count: usize) {
        for _ in 0..count {
            self.add_bot();
        }
    }

    /// Add bots until the configured bot count is back, returning how many were added
    pub fn respawn_bots(&mut self) -> usize {
        let alive = self.world.players().filter(|p| p.is_ai).count();
        let missing = self.config.bot_count.saturating_sub(alive);
        self.fill_with_bots(missing);
        missing
    }

    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        self.ai.unregister_bot(id);
        self.world.remove_player(id).is_some()
    }

    /// Steer a player toward a world-space point; non-finite targets are ignored
    pub fn set_aim(&mut self, id: PlayerId, target: Vec2) -> bool {
        self.world.set_aim(id, target)
    }

    pub fn split(&mut self, id: PlayerId) -> Result<usize, CommandRejected> {
        let created = lifecycle::split(&mut self.world, id)?;
        if created > 0 {
            self.command_splits += 1;
        }
        Ok(created)
    }

    pub fn eject(&mut self, id: PlayerId) -> Result<usize, CommandRejected> {
        let count = lifecycle::eject(&mut self.world, id, &mut self.events)?;
        if count > 0 {
            self.command_ejects += 1;
        }
        Ok(count)
    }

    /// Advance the world by one tick
    pub fn tick(&mut self, dt: f32) -> TickReport {
        let raw_dt = dt;
        let dt = sanitize_tick_dt(dt);
        if dt != raw_dt {
            trace!(raw = raw_dt, used = dt, "tick dt sanitized");
        }

        physics::update(&mut self.world, dt);
        lifecycle::update(&mut self.world, dt, &mut self.events);
        let collisions = self.collisions.resolve(&mut self.world, &mut self.events);
        let ai = self.ai.update(&mut self.world, &mut self.events, dt);
        enforce_bounds(&mut self.world);
        let spawned = spawn::update(&mut self.world, &self.config.spawn, &mut self.spawn_state, dt);

        for player in self.world.players.values_mut() {
            player.update_score();
        }

        self.world.tick += 1;
        self.world.time += dt as f64;

        let events = self.events.dispatch();
        let merges = events
            .iter()
            .filter(|e| matches!(e, GameEvent::CellMerge(_)))
            .count() as u32;

        let report = TickReport {
            tick: self.world.tick,
            dt,
            food_eaten: collisions.food_eaten,
            cells_eaten: collisions.cells_eaten,
            merges,
            splits: ai.splits + std::mem::take(&mut self.command_splits),
            ejects: ai.ejects + std::mem::take(&mut self.command_ejects),
            viruses_popped: collisions.viruses_popped,
            power_ups_collected: collisions.power_ups_collected,
            eliminations: collisions.players_eliminated,
            entities_dropped: collisions.entities_dropped,
            ai_fallbacks: ai.fallbacks,
            food_spawned: spawned.food,
            viruses_spawned: spawned.viruses,
            power_ups_spawned: spawned.power_ups,
            events,
        };

        trace!(
            tick = report.tick,
            players = self.world.player_count(),
            entities = self.world.entity_count(),
            "tick complete"
        );
        report
    }
}

/// Keep a circle inside the world, zeroing velocity into any wall it touched
fn clamp_body(bounds: &Bounds, position: &mut Vec2, velocity: &mut Vec2, radius: f32) {
    let clamped = bounds.clamp_circle(*position, radius);
    if clamped.x != position.x {
        velocity.x = 0.0;
    }
    if clamped.y != position.y {
        velocity.y = 0.0;
    }
    *position = clamped;
}

fn enforce_bounds(world: &mut World) {
    let bounds = world.bounds;
    for player in world.players.values_mut() {
        for cell in player.cells.iter_mut() {
            let radius = cell.radius();
            clamp_body(&bounds, &mut cell.position, &mut cell.velocity, radius);
        }
    }
    for food in world.food.iter_mut() {
        clamp_body(&bounds, &mut food.position, &mut food.velocity, food.radius);
    }
    for virus in world.viruses.iter_mut() {
        let radius = virus.radius();
        clamp_body(&bounds, &mut virus.position, &mut virus.velocity, radius);
    }
}
