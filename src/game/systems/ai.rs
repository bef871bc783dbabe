//! AI decision engine
//!
//! Each bot runs a small state machine. On its decision timer (or when stuck,
//! or when its behavior has outlived a random duration) it perceives the
//! world through a [`WorldQuery`], weighs its options by personality,
//! difficulty and short-term memory, and picks a [`Behavior`]. Every tick the
//! current behavior is turned into an [`AiCommand`]: an aim point, a steering
//! drive, and optional split/eject requests that go through the same
//! lifecycle cooldowns human commands do.

use rand::Rng;
use serde::Serialize;
use tracing::{debug, trace};

use crate::game::constants::ai::*;
use crate::game::constants::{split, world as world_consts};
use crate::game::events::EventBus;
use crate::game::spatial::{SpatialEntity, SpatialEntityId, SpatialGrid};
use crate::game::state::{Bounds, FxHashMap, Player, PlayerId, PowerUpType, World};
use crate::game::systems::lifecycle;
use crate::util::vec2::Vec2;

/// Fixed bias profile applied to action weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Personality {
    Aggressive,
    Cautious,
    Opportunistic,
    Balanced,
}

impl Personality {
    pub const ALL: [Personality; 4] = [
        Personality::Aggressive,
        Personality::Cautious,
        Personality::Opportunistic,
        Personality::Balanced,
    ];

    pub fn random(rng: &mut impl Rng) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    fn adjust(&self, w: &mut ActionWeights) {
        match self {
            Personality::Aggressive => {
                w.chase += 0.25;
                w.split += 0.3;
                w.hunt += 0.15;
                w.flee -= 0.25;
                w.ambush += 0.05;
                w.bait += 0.05;
                w.team_up -= 0.1;
                w.defend -= 0.15;
            }
            Personality::Cautious => {
                w.flee += 0.2;
                w.defend += 0.25;
                w.chase -= 0.2;
                w.split -= 0.2;
                w.feed += 0.1;
                w.scavenge += 0.1;
                w.hunt -= 0.1;
            }
            Personality::Opportunistic => {
                w.scavenge += 0.25;
                w.ambush += 0.2;
                w.bait += 0.15;
                w.split += 0.05;
                w.power_up += 0.2;
                w.team_up += 0.05;
            }
            Personality::Balanced => {}
        }
    }
}

/// Probability that each gate in the decision order fires
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActionWeights {
    pub flee: f32,
    pub chase: f32,
    pub feed: f32,
    pub split: f32,
    pub ambush: f32,
    pub defend: f32,
    pub scavenge: f32,
    pub patrol: f32,
    pub hunt: f32,
    pub bait: f32,
    pub team_up: f32,
    pub power_up: f32,
}

impl ActionWeights {
    pub const BASE: ActionWeights = ActionWeights {
        flee: 0.75,
        chase: 0.55,
        feed: 0.6,
        split: 0.25,
        ambush: 0.15,
        defend: 0.35,
        scavenge: 0.3,
        patrol: 0.4,
        hunt: 0.2,
        bait: 0.1,
        team_up: 0.15,
        power_up: 0.6,
    };

    /// Base weights adjusted by personality, difficulty and memory, each clamped to `[0, 1]`
    pub fn compute(personality: Personality, difficulty: u8, memory: &Memory) -> Self {
        let mut w = Self::BASE;
        personality.adjust(&mut w);

        let d = difficulty as f32;
        w.chase += 0.03 * d;
        w.split += 0.04 * d;
        w.flee += 0.02 * d;
        w.hunt += 0.02 * d;
        w.ambush += 0.02 * d;

        if memory.remembers(Recollection::Threat) {
            w.flee += 0.15;
            w.defend += 0.1;
        }
        if memory.remembers(Recollection::Prey) {
            w.chase += 0.1;
            w.hunt += 0.15;
        }

        w.clamped()
    }

    fn clamped(self) -> Self {
        let c = |v: f32| v.clamp(0.0, 1.0);
        Self {
            flee: c(self.flee),
            chase: c(self.chase),
            feed: c(self.feed),
            split: c(self.split),
            ambush: c(self.ambush),
            defend: c(self.defend),
            scavenge: c(self.scavenge),
            patrol: c(self.patrol),
            hunt: c(self.hunt),
            bait: c(self.bait),
            team_up: c(self.team_up),
            power_up: c(self.power_up),
        }
    }
}

/// One state of the bot state machine
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "behavior", rename_all = "snake_case")]
pub enum Behavior {
    Wander { heading: f32 },
    Chase { target: PlayerId },
    Flee { threat: PlayerId },
    Feed { target: Vec2 },
    SplitAndChase { target: PlayerId },
    Ambush { target: PlayerId, anchor: Vec2 },
    Defend { virus: Vec2, threat: PlayerId },
    Scavenge { target: Vec2 },
    Patrol { waypoint: Vec2 },
    Hunt { target: PlayerId, last_seen: Vec2 },
    Bait { target: PlayerId },
    TeamUp { ally: PlayerId },
}

impl Default for Behavior {
    fn default() -> Self {
        Behavior::Wander { heading: 0.0 }
    }
}

impl Behavior {
    pub fn name(&self) -> &'static str {
        match self {
            Behavior::Wander { .. } => "wander",
            Behavior::Chase { .. } => "chase",
            Behavior::Flee { .. } => "flee",
            Behavior::Feed { .. } => "feed",
            Behavior::SplitAndChase { .. } => "split_and_chase",
            Behavior::Ambush { .. } => "ambush",
            Behavior::Defend { .. } => "defend",
            Behavior::Scavenge { .. } => "scavenge",
            Behavior::Patrol { .. } => "patrol",
            Behavior::Hunt { .. } => "hunt",
            Behavior::Bait { .. } => "bait",
            Behavior::TeamUp { .. } => "team_up",
        }
    }

    /// Player this behavior needs to keep seeing. Hunt tracks by last-seen
    /// position instead, so it never loses its target outright.
    pub fn tracked_player(&self) -> Option<PlayerId> {
        match *self {
            Behavior::Chase { target }
            | Behavior::SplitAndChase { target }
            | Behavior::Ambush { target, .. }
            | Behavior::Bait { target } => Some(target),
            Behavior::Flee { threat } | Behavior::Defend { threat, .. } => Some(threat),
            Behavior::TeamUp { ally } => Some(ally),
            Behavior::Wander { .. }
            | Behavior::Feed { .. }
            | Behavior::Scavenge { .. }
            | Behavior::Patrol { .. }
            | Behavior::Hunt { .. } => None,
        }
    }
}

/// Per-bot decision failure; the bot falls back to Wander with zero drive
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AiError {
    #[error("bot {0} is not in the world")]
    PlayerMissing(PlayerId),
    #[error("bot {0} has no cells")]
    NoCells(PlayerId),
    #[error("bot {0} produced a non-finite value")]
    NonFinite(PlayerId),
}

// ============================================================================
// Perception
// ============================================================================

/// What a bot can know about a player
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub center: Vec2,
    pub velocity: Vec2,
    pub mass: f32,
    pub largest_radius: f32,
    pub largest_mass: f32,
    pub cell_count: usize,
    pub is_ai: bool,
    pub invisible: bool,
    pub split_cooldown: f32,
}

impl PlayerSummary {
    pub fn from_player(player: &Player) -> Self {
        let mass = player.total_mass();
        let mut momentum = Vec2::ZERO;
        for cell in player.cells() {
            momentum += cell.velocity * cell.mass();
        }
        let largest = player.largest_cell();
        Self {
            id: player.id,
            center: player.center(),
            velocity: if mass > 0.0 { momentum / mass } else { Vec2::ZERO },
            mass,
            largest_radius: largest.map_or(0.0, |c| c.radius()),
            largest_mass: largest.map_or(0.0, |c| c.mass()),
            cell_count: player.cells().len(),
            is_ai: player.is_ai,
            invisible: player.has_effect(PowerUpType::Invisibility),
            split_cooldown: player.split_cooldown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoodSummary {
    pub position: Vec2,
    pub value: f32,
    pub ejected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirusSummary {
    pub position: Vec2,
    pub radius: f32,
    pub split_threshold: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerUpSummary {
    pub position: Vec2,
    pub kind: PowerUpType,
}

/// Synchronous read access to the world for decision making
pub trait WorldQuery {
    fn bounds(&self) -> Bounds;
    fn player(&self, id: PlayerId) -> Option<&PlayerSummary>;
    fn players(&self) -> &[PlayerSummary];
    /// Food whose center lies within `radius` of `position`
    fn food_near(&self, position: Vec2, radius: f32) -> Vec<FoodSummary>;
    fn viruses(&self) -> &[VirusSummary];
    fn power_ups(&self) -> &[PowerUpSummary];

    /// A player that can currently be seen (alive and not invisible)
    fn visible_player(&self, id: PlayerId) -> Option<&PlayerSummary> {
        self.player(id).filter(|p| !p.invisible && p.cell_count > 0)
    }
}

/// Read-only copy of the world taken once per AI pass
#[derive(Debug, Clone)]
pub struct WorldSnapshot {
    bounds: Bounds,
    players: Vec<PlayerSummary>,
    food: Vec<FoodSummary>,
    food_grid: SpatialGrid,
    viruses: Vec<VirusSummary>,
    power_ups: Vec<PowerUpSummary>,
}

impl WorldSnapshot {
    pub fn capture(world: &World) -> Self {
        let mut players: Vec<PlayerSummary> = world.players().map(PlayerSummary::from_player).collect();
        players.sort_unstable_by_key(|p| p.id);

        let food: Vec<FoodSummary> = world
            .food
            .iter()
            .map(|f| FoodSummary {
                position: f.position,
                value: f.value,
                ejected: f.is_ejected(),
            })
            .collect();

        let mut food_grid = SpatialGrid::default();
        food_grid.rebuild(food.iter().enumerate().map(|(i, f)| SpatialEntity {
            id: SpatialEntityId::Food(i),
            position: f.position,
            radius: 0.0,
        }));

        Self {
            bounds: world.bounds,
            players,
            food,
            food_grid,
            viruses: world
                .viruses
                .iter()
                .map(|v| VirusSummary {
                    position: v.position,
                    radius: v.radius(),
                    split_threshold: v.split_threshold,
                })
                .collect(),
            power_ups: world
                .power_ups
                .iter()
                .map(|p| PowerUpSummary {
                    position: p.position,
                    kind: p.kind,
                })
                .collect(),
        }
    }
}

impl WorldQuery for WorldSnapshot {
    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn player(&self, id: PlayerId) -> Option<&PlayerSummary> {
        self.players
            .binary_search_by_key(&id, |p| p.id)
            .ok()
            .map(|i| &self.players[i])
    }

    fn players(&self) -> &[PlayerSummary] {
        &self.players
    }

    fn food_near(&self, position: Vec2, radius: f32) -> Vec<FoodSummary> {
        let radius_sq = radius * radius;
        self.food_grid
            .query_radius(position, radius)
            .filter(|e| e.position.distance_sq_to(position) <= radius_sq)
            .filter_map(|e| match e.id {
                SpatialEntityId::Food(i) => self.food.get(i).copied(),
                _ => None,
            })
            .collect()
    }

    fn viruses(&self) -> &[VirusSummary] {
        &self.viruses
    }

    fn power_ups(&self) -> &[PowerUpSummary] {
        &self.power_ups
    }
}

/// A nearby player as seen by a bot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sighting {
    pub id: PlayerId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub mass: f32,
    pub radius: f32,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointSighting<T> {
    pub item: T,
    pub distance: f32,
}

/// Everything within detection radius, each list sorted nearest first
#[derive(Debug, Clone, Default)]
pub struct Perception {
    pub detection_radius: f32,
    pub threats: Vec<Sighting>,
    pub prey: Vec<Sighting>,
    pub teammates: Vec<Sighting>,
    pub food: Vec<PointSighting<FoodSummary>>,
    pub viruses: Vec<PointSighting<VirusSummary>>,
    pub power_ups: Vec<PointSighting<PowerUpSummary>>,
}

#[inline]
pub fn detection_radius(mass: f32, difficulty: u8) -> f32 {
    DETECTION_BASE + mass / DETECTION_MASS_DIVISOR + difficulty as f32 * DETECTION_PER_DIFFICULTY
}

#[inline]
pub fn decision_interval(difficulty: u8) -> f32 {
    (DECISION_INTERVAL_BASE - DECISION_INTERVAL_PER_DIFFICULTY * difficulty as f32).max(DECISION_INTERVAL_MIN)
}

fn by_distance(a: f32, b: f32) -> std::cmp::Ordering {
    a.total_cmp(&b)
}

/// Classify everything within detection radius
pub fn perceive<Q: WorldQuery + ?Sized>(me: &PlayerSummary, difficulty: u8, world: &Q) -> Perception {
    let radius = detection_radius(me.mass, difficulty);
    let mut p = Perception {
        detection_radius: radius,
        ..Default::default()
    };

    for other in world.players() {
        if other.id == me.id || other.invisible || other.cell_count == 0 {
            continue;
        }
        let distance = me.center.distance_to(other.center);
        if !(distance <= radius) {
            continue;
        }
        let sighting = Sighting {
            id: other.id,
            position: other.center,
            velocity: other.velocity,
            mass: other.mass,
            radius: other.largest_radius,
            distance,
        };
        if other.mass > me.mass * THREAT_RATIO {
            p.threats.push(sighting);
        } else if other.mass < me.mass * PREY_RATIO {
            p.prey.push(sighting);
        }
        if other.is_ai && (other.mass - me.mass).abs() <= me.mass * TEAMMATE_TOLERANCE {
            p.teammates.push(sighting);
        }
    }

    p.food = world
        .food_near(me.center, radius)
        .into_iter()
        .map(|item| PointSighting {
            distance: me.center.distance_to(item.position),
            item,
        })
        .collect();
    p.food.sort_by(|a, b| by_distance(a.distance, b.distance));
    p.food.truncate(FOOD_PERCEPTION_LIMIT);

    p.viruses = world
        .viruses()
        .iter()
        .map(|v| PointSighting {
            item: *v,
            distance: me.center.distance_to(v.position),
        })
        .filter(|s| s.distance <= radius)
        .collect();
    p.power_ups = world
        .power_ups()
        .iter()
        .map(|pu| PointSighting {
            item: *pu,
            distance: me.center.distance_to(pu.position),
        })
        .filter(|s| s.distance <= radius)
        .collect();

    for list in [&mut p.threats, &mut p.prey, &mut p.teammates] {
        list.sort_by(|a, b| by_distance(a.distance, b.distance).then(a.id.cmp(&b.id)));
    }
    p.viruses.sort_by(|a, b| by_distance(a.distance, b.distance));
    p.power_ups.sort_by(|a, b| by_distance(a.distance, b.distance));
    p
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recollection {
    Threat,
    Prey,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryEntry {
    pub kind: Recollection,
    pub remaining: f32,
    pub last_seen: Vec2,
}

/// Short-term memory of recently seen threats and prey
#[derive(Debug, Clone, Default)]
pub struct Memory {
    entries: FxHashMap<PlayerId, MemoryEntry>,
}

impl Memory {
    pub fn remember(&mut self, id: PlayerId, kind: Recollection, position: Vec2) {
        self.entries.insert(
            id,
            MemoryEntry {
                kind,
                remaining: MEMORY_DURATION,
                last_seen: position,
            },
        );
    }

    /// Record every threat and prey in a perception
    pub fn observe(&mut self, perception: &Perception) {
        for s in &perception.threats {
            self.remember(s.id, Recollection::Threat, s.position);
        }
        for s in &perception.prey {
            self.remember(s.id, Recollection::Prey, s.position);
        }
    }

    pub fn decay(&mut self, dt: f32) {
        self.entries.retain(|_, entry| {
            entry.remaining -= dt;
            entry.remaining > 0.0
        });
    }

    pub fn remembers(&self, kind: Recollection) -> bool {
        self.entries.values().any(|e| e.kind == kind)
    }

    /// Freshest memory of `kind` (ties broken by lowest id)
    pub fn recall(&self, kind: Recollection) -> Option<(PlayerId, MemoryEntry)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.kind == kind)
            .max_by(|(ia, a), (ib, b)| a.remaining.total_cmp(&b.remaining).then(ib.cmp(ia)))
            .map(|(id, e)| (*id, *e))
    }

    pub fn forget(&mut self, id: PlayerId) {
        self.entries.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Decision
// ============================================================================

#[inline]
fn chance(rng: &mut impl Rng, p: f32) -> bool {
    rng.gen::<f32>() < p
}

/// Pick a behavior by running the probability gates in priority order:
/// power-ups, threats, prey tactics, team-up, virus defense, food, then
/// patrol or wander.
pub fn decide(
    me: &PlayerSummary,
    perception: &Perception,
    weights: &ActionWeights,
    memory: &Memory,
    bounds: Bounds,
    rng: &mut impl Rng,
) -> Behavior {
    if let Some(pu) = perception.power_ups.first() {
        if chance(rng, weights.power_up) {
            return Behavior::Feed {
                target: pu.item.position,
            };
        }
    }

    if let Some(threat) = perception.threats.first() {
        if chance(rng, weights.flee) {
            return Behavior::Flee { threat: threat.id };
        }
    }

    if let Some(prey) = perception.prey.first() {
        let split_ready = me.split_cooldown <= 0.0
            && me.cell_count < split::MAX_CELLS
            && prey.distance < SPLIT_ATTACK_RANGE + me.largest_radius;
        if split_ready && chance(rng, weights.split) {
            return Behavior::SplitAndChase { target: prey.id };
        }
        if let Some(virus) = perception.viruses.first() {
            if chance(rng, weights.ambush) {
                return Behavior::Ambush {
                    target: prey.id,
                    anchor: virus.item.position,
                };
            }
        }
        if chance(rng, weights.hunt) {
            return Behavior::Hunt {
                target: prey.id,
                last_seen: prey.position,
            };
        }
        if chance(rng, weights.bait) {
            return Behavior::Bait { target: prey.id };
        }
        if chance(rng, weights.chase) {
            return Behavior::Chase { target: prey.id };
        }
    } else if let Some((id, entry)) = memory.recall(Recollection::Prey) {
        if chance(rng, weights.hunt) {
            return Behavior::Hunt {
                target: id,
                last_seen: entry.last_seen,
            };
        }
    }

    if let Some(ally) = perception.teammates.first() {
        if chance(rng, weights.team_up) {
            return Behavior::TeamUp { ally: ally.id };
        }
    }

    if let Some(threat) = perception.threats.first() {
        let shelter = perception
            .viruses
            .iter()
            .find(|v| me.largest_radius < v.item.split_threshold);
        if let Some(virus) = shelter {
            if chance(rng, weights.defend) {
                return Behavior::Defend {
                    virus: virus.item.position,
                    threat: threat.id,
                };
            }
        }
    }

    if let Some(ejected) = perception.food.iter().find(|f| f.item.ejected) {
        if chance(rng, weights.scavenge) {
            return Behavior::Scavenge {
                target: ejected.item.position,
            };
        }
    }

    if let Some(food) = perception.food.first() {
        if chance(rng, weights.feed) {
            return Behavior::Feed {
                target: food.item.position,
            };
        }
    }

    if chance(rng, weights.patrol) {
        return Behavior::Patrol {
            waypoint: bounds.random_point(rng, world_consts::SPAWN_MARGIN),
        };
    }

    Behavior::Wander {
        heading: rng.gen_range(0.0..std::f32::consts::TAU),
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Per-tick output of a bot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AiCommand {
    pub aim: Vec2,
    pub drive: f32,
    pub split: bool,
    pub eject: bool,
}

impl AiCommand {
    pub fn toward(aim: Vec2, drive: f32) -> Self {
        Self {
            aim,
            drive,
            split: false,
            eject: false,
        }
    }

    pub fn coast(at: Vec2) -> Self {
        Self::toward(at, 0.0)
    }
}

/// Bend a heading back toward the arena when close to a wall
fn avoid_walls(dir: Vec2, position: Vec2, bounds: Bounds) -> Vec2 {
    let mut push = Vec2::ZERO;
    if position.x < WALL_AVOID_MARGIN {
        push.x += 1.0 - position.x / WALL_AVOID_MARGIN;
    } else if position.x > bounds.width - WALL_AVOID_MARGIN {
        push.x -= 1.0 - (bounds.width - position.x) / WALL_AVOID_MARGIN;
    }
    if position.y < WALL_AVOID_MARGIN {
        push.y += 1.0 - position.y / WALL_AVOID_MARGIN;
    } else if position.y > bounds.height - WALL_AVOID_MARGIN {
        push.y -= 1.0 - (bounds.height - position.y) / WALL_AVOID_MARGIN;
    }
    (dir + push * 2.0).normalize_or(dir)
}

fn steer(from: Vec2, dir: Vec2, drive: f32) -> AiCommand {
    AiCommand::toward(from + dir * WANDER_LOOKAHEAD, drive)
}

/// Aim slightly ahead of a moving target
fn lead(me: &PlayerSummary, target: &PlayerSummary) -> Vec2 {
    let distance = me.center.distance_to(target.center);
    let time_to_reach = distance / (me.velocity.length() + 200.0);
    target.center + target.velocity * (time_to_reach * 0.5)
}

fn arrived(me: &PlayerSummary, point: Vec2) -> bool {
    me.center.distance_to(point) < me.largest_radius + ARRIVAL_DISTANCE
}

/// Point on the far side of `anchor` from `from`, `gap` units out
fn behind(anchor: Vec2, from: Vec2, gap: f32) -> Vec2 {
    anchor + (anchor - from).normalize_or(Vec2::RIGHT) * gap
}

/// Per-bot state
#[derive(Debug, Clone)]
pub struct AiState {
    pub personality: Personality,
    pub difficulty: u8,
    pub behavior: Behavior,
    pub decision_timer: f32,
    pub behavior_elapsed: f32,
    pub behavior_duration: f32,
    pub memory: Memory,
    stuck_anchor: Vec2,
    stuck_timer: f32,
}

impl AiState {
    pub fn new(personality: Personality, difficulty: u8) -> Self {
        Self {
            personality,
            difficulty: difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY),
            behavior: Behavior::default(),
            decision_timer: 0.0,
            behavior_elapsed: 0.0,
            behavior_duration: BEHAVIOR_DURATION_MIN,
            memory: Memory::default(),
            stuck_anchor: Vec2::new(f32::MAX, f32::MAX),
            stuck_timer: 0.0,
        }
    }

    /// Advance stuck detection; true once the bot has barely moved for too long
    fn update_stuck(&mut self, position: Vec2, dt: f32) -> bool {
        if position.distance_to(self.stuck_anchor) >= STUCK_DISTANCE {
            self.stuck_anchor = position;
            self.stuck_timer = 0.0;
            return false;
        }
        self.stuck_timer += dt;
        if self.stuck_timer > STUCK_TIME {
            self.stuck_timer = 0.0;
            return true;
        }
        false
    }

    /// Safe default after a failed decision
    pub fn fall_back(&mut self, rng: &mut impl Rng) {
        self.behavior = Behavior::Wander {
            heading: rng.gen_range(0.0..std::f32::consts::TAU),
        };
        self.decision_timer = decision_interval(self.difficulty);
        self.behavior_elapsed = 0.0;
    }

    /// One tick of thinking for bot `id`
    pub fn think<Q: WorldQuery + ?Sized>(
        &mut self,
        id: PlayerId,
        world: &Q,
        rng: &mut impl Rng,
        dt: f32,
    ) -> Result<AiCommand, AiError> {
        let me = world.player(id).ok_or(AiError::PlayerMissing(id))?;
        if me.cell_count == 0 {
            return Err(AiError::NoCells(id));
        }
        if !me.center.is_finite() || !me.mass.is_finite() {
            return Err(AiError::NonFinite(id));
        }

        self.memory.decay(dt);
        self.decision_timer -= dt;
        self.behavior_elapsed += dt;

        let stuck = self.update_stuck(me.center, dt);
        let expired =
            self.behavior_elapsed > self.behavior_duration && rng.gen_bool(BEHAVIOR_EXPIRY_CHANCE);
        let target_lost = self
            .behavior
            .tracked_player()
            .is_some_and(|t| world.visible_player(t).is_none());

        if self.decision_timer <= 0.0 || stuck || expired || target_lost {
            let perception = perceive(me, self.difficulty, world);
            self.memory.observe(&perception);
            let weights = ActionWeights::compute(self.personality, self.difficulty, &self.memory);
            let previous = self.behavior;
            self.behavior = decide(me, &perception, &weights, &self.memory, world.bounds(), rng);
            self.decision_timer = decision_interval(self.difficulty);
            self.behavior_elapsed = 0.0;
            self.behavior_duration = rng.gen_range(BEHAVIOR_DURATION_MIN..=BEHAVIOR_DURATION_MAX);

            if previous.name() != self.behavior.name() {
                trace!(
                    bot = id,
                    from = previous.name(),
                    to = self.behavior.name(),
                    stuck,
                    target_lost,
                    "behavior change"
                );
            }
        }

        let command = self.execute(me, world, rng, dt);
        if !command.aim.is_finite() || !command.drive.is_finite() {
            return Err(AiError::NonFinite(id));
        }
        Ok(command)
    }

    /// Turn the current behavior into this tick's command
    fn execute<Q: WorldQuery + ?Sized>(
        &mut self,
        me: &PlayerSummary,
        world: &Q,
        rng: &mut impl Rng,
        dt: f32,
    ) -> AiCommand {
        let bounds = world.bounds();

        match self.behavior {
            Behavior::Wander { heading } => {
                let turned = heading + rng.gen_range(-1.0f32..=1.0) * WANDER_TURN_RATE * dt;
                let dir = avoid_walls(Vec2::from_angle(turned), me.center, bounds);
                self.behavior = Behavior::Wander { heading: dir.angle() };
                steer(me.center, dir, drive::WANDER)
            }
            Behavior::Chase { target } => match world.visible_player(target) {
                Some(t) => AiCommand::toward(lead(me, t), drive::CHASE),
                None => self.lost_target(me),
            },
            Behavior::Flee { threat } => match world.visible_player(threat) {
                Some(t) => {
                    let away = (me.center - t.center).normalize_or(Vec2::RIGHT);
                    steer(me.center, avoid_walls(away, me.center, bounds), drive::FLEE)
                }
                None => self.lost_target(me),
            },
            Behavior::Feed { target } => {
                if arrived(me, target) {
                    self.decision_timer = 0.0;
                }
                AiCommand::toward(target, drive::FEED)
            }
            Behavior::SplitAndChase { target } => match world.visible_player(target) {
                Some(t) => {
                    let mut cmd = AiCommand::toward(t.center, drive::SPLIT_ATTACK);
                    let in_range = me.center.distance_to(t.center) < SPLIT_ATTACK_RANGE + me.largest_radius;
                    let can_split = me.split_cooldown <= 0.0 && me.largest_mass >= 2.0 * split::MIN_MASS;
                    if in_range && can_split {
                        cmd.split = true;
                        self.behavior = Behavior::Chase { target };
                    }
                    cmd
                }
                None => self.lost_target(me),
            },
            Behavior::Ambush { target, anchor } => match world.visible_player(target) {
                Some(t) => {
                    if me.center.distance_to(t.center) < AMBUSH_STRIKE_DISTANCE + me.largest_radius {
                        self.behavior = Behavior::Chase { target };
                        AiCommand::toward(lead(me, t), drive::CHASE)
                    } else {
                        let lurk = behind(anchor, t.center, me.largest_radius * 2.0 + ARRIVAL_DISTANCE);
                        AiCommand::toward(lurk, drive::AMBUSH_LURK)
                    }
                }
                None => self.lost_target(me),
            },
            Behavior::Defend { virus, threat } => match world.visible_player(threat) {
                Some(t) => {
                    let shelter = behind(virus, t.center, me.largest_radius * 2.0 + ARRIVAL_DISTANCE);
                    AiCommand::toward(shelter, drive::DEFEND)
                }
                None => self.lost_target(me),
            },
            Behavior::Scavenge { target } => {
                if arrived(me, target) {
                    self.decision_timer = 0.0;
                }
                AiCommand::toward(target, drive::SCAVENGE)
            }
            Behavior::Patrol { waypoint } => {
                let waypoint = if arrived(me, waypoint) {
                    let next = bounds.random_point(rng, world_consts::SPAWN_MARGIN);
                    self.behavior = Behavior::Patrol { waypoint: next };
                    next
                } else {
                    waypoint
                };
                AiCommand::toward(waypoint, drive::PATROL)
            }
            Behavior::Hunt { target, last_seen } => {
                let radius = detection_radius(me.mass, self.difficulty);
                let seen = world
                    .visible_player(target)
                    .filter(|t| me.center.distance_to(t.center) <= radius);
                match seen {
                    Some(t) => {
                        self.behavior = Behavior::Hunt {
                            target,
                            last_seen: t.center,
                        };
                        AiCommand::toward(lead(me, t), drive::HUNT)
                    }
                    None => {
                        if arrived(me, last_seen) {
                            self.memory.forget(target);
                            self.decision_timer = 0.0;
                        }
                        AiCommand::toward(last_seen, drive::HUNT)
                    }
                }
            }
            Behavior::Bait { target } => match world.visible_player(target) {
                Some(t) => {
                    if rng.gen_bool(BAIT_EJECT_CHANCE) {
                        let mut cmd = AiCommand::toward(t.center, drive::BAIT);
                        cmd.eject = true;
                        cmd
                    } else {
                        AiCommand::toward(behind(t.center, me.center, -BAIT_DISTANCE), drive::BAIT)
                    }
                }
                None => self.lost_target(me),
            },
            Behavior::TeamUp { ally } => match world.visible_player(ally) {
                Some(a) => {
                    if rng.gen_bool(FEED_ALLY_CHANCE) {
                        let mut cmd = AiCommand::toward(a.center, drive::TEAM_UP);
                        cmd.eject = true;
                        cmd
                    } else {
                        AiCommand::toward(behind(a.center, me.center, -TEAM_DISTANCE), drive::TEAM_UP)
                    }
                }
                None => self.lost_target(me),
            },
        }
    }

    fn lost_target(&mut self, me: &PlayerSummary) -> AiCommand {
        self.decision_timer = 0.0;
        AiCommand::coast(me.center)
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Counters for one AI pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AiStats {
    pub bots: u32,
    pub fallbacks: u32,
    pub splits: u32,
    pub ejects: u32,
}

/// AI manager for all bots
#[derive(Debug, Default)]
pub struct AiManager {
    states: FxHashMap<PlayerId, AiState>,
}

impl AiManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_bot(&mut self, player_id: PlayerId, personality: Personality, difficulty: u8) {
        self.states.insert(player_id, AiState::new(personality, difficulty));
    }

    pub fn unregister_bot(&mut self, player_id: PlayerId) {
        self.states.remove(&player_id);
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&AiState> {
        self.states.get(&player_id)
    }

    pub fn get_mut(&mut self, player_id: PlayerId) -> Option<&mut AiState> {
        self.states.get_mut(&player_id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Run every bot once against a snapshot of the world and apply the
    /// resulting commands. Bots whose player has left the world are dropped.
    pub fn update(&mut self, world: &mut World, events: &mut EventBus, dt: f32) -> AiStats {
        let mut stats = AiStats::default();
        let snapshot = WorldSnapshot::capture(world);

        let mut ids: Vec<PlayerId> = self.states.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            if world.get_player(id).is_none() {
                self.states.remove(&id);
                continue;
            }
            let Some(ai) = self.states.get_mut(&id) else {
                continue;
            };
            stats.bots += 1;

            let command = match ai.think(id, &snapshot, &mut world.rng, dt) {
                Ok(command) => command,
                Err(e) => {
                    debug!(bot = id, error = %e, "AI decision failed, falling back to wander");
                    ai.fall_back(&mut world.rng);
                    stats.fallbacks += 1;
                    let aim = world.get_player(id).map_or(Vec2::ZERO, |p| p.aim);
                    AiCommand::coast(aim)
                }
            };

            apply_command(world, events, id, command, &mut stats);
        }

        stats
    }
}

fn apply_command(world: &mut World, events: &mut EventBus, id: PlayerId, command: AiCommand, stats: &mut AiStats) {
    let Some(player) = world.get_player_mut(id) else {
        return;
    };
    player.aim = command.aim;
    player.drive = command.drive;

    if command.split {
        if let Ok(created) = lifecycle::split(world, id) {
            if created > 0 {
                stats.splits += 1;
            }
        }
    }
    if command.eject {
        if let Ok(count) = lifecycle::eject(world, id, events) {
            if count > 0 {
                stats.ejects += 1;
            }
        }
    }
}

/// Generate bot names
pub fn generate_bot_name(rng: &mut impl Rng) -> String {
    let prefixes = ["Blob", "Cell", "Nom", "Goo", "Mito", "Amoeba", "Spore", "Plasma"];
    let suffixes = ["X", "Prime", "Alpha", "Beta", "One", "Zero", "Max", "Pro"];

    format!(
        "{}{}",
        prefixes[rng.gen_range(0..prefixes.len())],
        suffixes[rng.gen_range(0..suffixes.len())]
    )
}
