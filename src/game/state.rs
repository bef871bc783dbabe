//! Simulation state definitions
//!
//! Contains all entities (player cells, food, viruses, power-ups) and the
//! world that owns them. Cells are stored by value inside their owning
//! player; a cell refers back to its owner only by id.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::constants::{
    self, eject, food, mass, merge, power_up, split, virus, world as world_consts,
};
use crate::util::vec2::Vec2;

/// Hash map with a deterministic hasher (iteration order depends only on insertions)
pub type FxHashMap<K, V> = hashbrown::HashMap<K, V, rustc_hash::FxBuildHasher>;

/// Unique player identifier
pub type PlayerId = u32;

/// Entity identifier for non-player entities (food, viruses, power-ups)
pub type EntityId = u64;

/// Per-player cell storage, inline up to the cell cap
pub type CellList = SmallVec<[Cell; split::MAX_CELLS]>;

/// Entity class tag, set at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Cell,
    Food,
    EjectedMass,
    Virus,
    PowerUp,
}

/// Malformed entity detected during validation
#[derive(Debug, Clone, thiserror::Error)]
pub enum EntityError {
    #[error("{kind:?} has non-finite position ({x}, {y})")]
    NonFinitePosition { kind: EntityKind, x: f32, y: f32 },
    #[error("{kind:?} has invalid radius {radius}")]
    InvalidRadius { kind: EntityKind, radius: f32 },
    #[error("{kind:?} has invalid mass {mass}")]
    InvalidMass { kind: EntityKind, mass: f32 },
}

fn check_body(kind: EntityKind, position: Vec2, radius: f32, mass: f32) -> Result<(), EntityError> {
    if !position.is_finite() {
        return Err(EntityError::NonFinitePosition {
            kind,
            x: position.x,
            y: position.y,
        });
    }
    if !radius.is_finite() || radius <= 0.0 {
        return Err(EntityError::InvalidRadius { kind, radius });
    }
    if !mass.is_finite() || mass <= 0.0 {
        return Err(EntityError::InvalidMass { kind, mass });
    }
    Ok(())
}

/// RGB color handed to renderers untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const VIRUS: Color = Color::rgb(0x33, 0xFF, 0x33);

    const PALETTE: [Color; 12] = [
        Color::rgb(0xFF, 0x41, 0x36),
        Color::rgb(0xFF, 0x6B, 0x35),
        Color::rgb(0xFF, 0xDC, 0x00),
        Color::rgb(0x2E, 0xCC, 0x40),
        Color::rgb(0x00, 0x74, 0xD9),
        Color::rgb(0x7F, 0xDB, 0xFF),
        Color::rgb(0xB1, 0x0D, 0xC9),
        Color::rgb(0xF0, 0x12, 0xBE),
        Color::rgb(0xFF, 0x69, 0xB4),
        Color::rgb(0x01, 0xFF, 0x70),
        Color::rgb(0x39, 0xCC, 0xCC),
        Color::rgb(0x8B, 0xC3, 0x4A),
    ];

    pub fn random(rng: &mut impl Rng) -> Self {
        Self::PALETTE[rng.gen_range(0..Self::PALETTE.len())]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// A single mass-bearing circle owned by a player
///
/// `mass` and `radius` are private so that `mass == π·radius²` holds after
/// every change; use [`Cell::set_mass`] and friends.
#[derive(Debug, Clone, Serialize)]
pub struct Cell {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Force accumulated this tick, consumed by the integrator
    #[serde(skip)]
    pub force: Vec2,
    mass: f32,
    radius: f32,
    pub color: Color,
    pub owner: PlayerId,
    pub can_merge: bool,
    /// Seconds until `can_merge` flips back to true
    pub merge_timer: f32,
    /// Last position that passed the finite check
    #[serde(skip)]
    pub(crate) last_valid_position: Vec2,
}

impl Cell {
    pub fn new(owner: PlayerId, position: Vec2, mass: f32, color: Color) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            force: Vec2::ZERO,
            mass,
            radius: constants::mass_to_radius(mass),
            color,
            owner,
            can_merge: true,
            merge_timer: 0.0,
            last_valid_position: position,
        }
    }

    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Set mass and re-derive radius
    pub fn set_mass(&mut self, mass: f32) {
        self.mass = mass;
        self.radius = constants::mass_to_radius(mass);
    }

    pub fn add_mass(&mut self, amount: f32) {
        self.set_mass(self.mass + amount);
    }

    /// Block merging for the full merge cooldown
    pub fn start_merge_cooldown(&mut self) {
        self.can_merge = false;
        self.merge_timer = merge::COOLDOWN;
    }

    pub fn apply_force(&mut self, force: Vec2) {
        self.force += force;
    }

    pub fn overlaps(&self, position: Vec2, radius: f32) -> bool {
        let reach = self.radius + radius;
        self.position.distance_sq_to(position) < reach * reach
    }

    pub fn validate(&self) -> Result<(), EntityError> {
        check_body(EntityKind::Cell, self.position, self.radius, self.mass)
    }
}

/// Power-up types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerUpType {
    Speed,
    Shield,
    MassBoost,
    Invisibility,
}

impl PowerUpType {
    pub const ALL: [PowerUpType; 4] = [
        PowerUpType::Speed,
        PowerUpType::Shield,
        PowerUpType::MassBoost,
        PowerUpType::Invisibility,
    ];

    pub fn duration(&self) -> f32 {
        match self {
            PowerUpType::Speed => power_up::SPEED_DURATION,
            PowerUpType::Shield => power_up::SHIELD_DURATION,
            PowerUpType::MassBoost => power_up::MASS_BOOST_DURATION,
            PowerUpType::Invisibility => power_up::INVISIBILITY_DURATION,
        }
    }

    pub fn color(&self) -> Color {
        match self {
            PowerUpType::Speed => Color::rgb(0xFF, 0xD7, 0x00),
            PowerUpType::Shield => Color::rgb(0x1E, 0x90, 0xFF),
            PowerUpType::MassBoost => Color::rgb(0xFF, 0x45, 0x00),
            PowerUpType::Invisibility => Color::rgb(0xC0, 0xC0, 0xC0),
        }
    }
}

/// Active power-up effects: type → remaining seconds
///
/// Read-only outside the crate; lifecycle and collision code are the only writers.
#[derive(Debug, Clone, Default)]
pub struct ActiveEffects {
    remaining: FxHashMap<PowerUpType, f32>,
}

impl ActiveEffects {
    pub fn is_active(&self, effect: PowerUpType) -> bool {
        self.remaining.get(&effect).is_some_and(|t| *t > 0.0)
    }

    pub fn remaining(&self, effect: PowerUpType) -> f32 {
        self.remaining.get(&effect).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PowerUpType, f32)> + '_ {
        self.remaining.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.remaining.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Set or extend an effect. Returns true if it was not active before.
    pub(crate) fn grant(&mut self, effect: PowerUpType, duration: f32) -> bool {
        let entry = self.remaining.entry(effect).or_insert(0.0);
        let newly_active = *entry <= 0.0;
        *entry = entry.max(0.0) + duration;
        newly_active
    }

    /// Count down every effect and return the ones that just expired
    pub(crate) fn tick(&mut self, dt: f32) -> SmallVec<[PowerUpType; 4]> {
        let mut expired = SmallVec::new();
        for (effect, remaining) in self.remaining.iter_mut() {
            *remaining = (*remaining - dt).max(0.0);
            if *remaining <= 0.0 {
                expired.push(*effect);
            }
        }
        // Iteration order of the map is not sorted; keep expiry handling stable
        expired.sort_by_key(|e| *e as u8);
        for effect in &expired {
            self.remaining.remove(effect);
        }
        expired
    }
}

/// Player (human or AI)
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub color: Color,
    pub is_ai: bool,
    pub(crate) cells: CellList,
    /// Highest total mass reached
    pub score: f32,
    pub(crate) effects: ActiveEffects,
    /// World-space point the cells steer toward and split/eject along
    pub aim: Vec2,
    /// Steering strength, 0 = coast
    pub drive: f32,
    /// Seconds until the next split is accepted
    pub split_cooldown: f32,
    /// Seconds until the next eject is accepted
    pub eject_cooldown: f32,
    /// Last known mass-weighted center (kept after the last cell dies)
    pub last_center: Vec2,
    /// Player that ate one of our cells in the current collision pass
    pub last_attacker: Option<PlayerId>,
}

impl Player {
    pub fn new(id: PlayerId, name: String, is_ai: bool, color: Color) -> Self {
        Self {
            id,
            name,
            color,
            is_ai,
            cells: CellList::new(),
            score: 0.0,
            effects: ActiveEffects::default(),
            aim: Vec2::ZERO,
            drive: 0.0,
            split_cooldown: 0.0,
            eject_cooldown: 0.0,
            last_center: Vec2::ZERO,
            last_attacker: None,
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn effects(&self) -> &ActiveEffects {
        &self.effects
    }

    pub fn has_effect(&self, effect: PowerUpType) -> bool {
        self.effects.is_active(effect)
    }

    pub fn is_eliminated(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn total_mass(&self) -> f32 {
        self.cells.iter().map(|c| c.mass()).sum()
    }

    /// Mass-weighted center of all cells
    pub fn center(&self) -> Vec2 {
        let total = self.total_mass();
        if self.cells.is_empty() || total <= 0.0 {
            return self.cells.first().map_or(self.last_center, |c| c.position);
        }
        let mut weighted = Vec2::ZERO;
        for cell in &self.cells {
            weighted += cell.position * cell.mass();
        }
        weighted / total
    }

    pub fn largest_cell(&self) -> Option<&Cell> {
        self.cells
            .iter()
            .max_by(|a, b| a.mass().total_cmp(&b.mass()))
    }

    pub fn update_score(&mut self) {
        let mass = self.total_mass();
        if mass > self.score {
            self.score = mass;
        }
    }

    pub(crate) fn add_cell(&mut self, mut cell: Cell) {
        cell.owner = self.id;
        cell.color = self.color;
        self.cells.push(cell);
    }
}

/// Food flavor
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FoodKind {
    /// Ambient pellet spawned by the world
    Pellet,
    /// Mass ejected by a player's cell
    Ejected { owner: PlayerId, age: f32 },
}

/// Food pellet or ejected mass
#[derive(Debug, Clone, Serialize)]
pub struct Food {
    pub id: EntityId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    /// Mass granted on consumption
    pub value: f32,
    pub color: Color,
    pub kind: FoodKind,
}

impl Food {
    pub fn pellet(id: EntityId, position: Vec2, value: f32, color: Color) -> Self {
        Self {
            id,
            position,
            velocity: Vec2::ZERO,
            radius: food::RADIUS,
            value,
            color,
            kind: FoodKind::Pellet,
        }
    }

    pub fn ejected(id: EntityId, owner: PlayerId, position: Vec2, velocity: Vec2, color: Color) -> Self {
        Self {
            id,
            position,
            velocity,
            radius: eject::RADIUS,
            value: eject::MASS,
            color,
            kind: FoodKind::Ejected { owner, age: 0.0 },
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self.kind {
            FoodKind::Pellet => EntityKind::Food,
            FoodKind::Ejected { .. } => EntityKind::EjectedMass,
        }
    }

    pub fn is_ejected(&self) -> bool {
        matches!(self.kind, FoodKind::Ejected { .. })
    }

    /// Whether `player` may absorb this food right now
    pub fn edible_by(&self, player: PlayerId) -> bool {
        match self.kind {
            FoodKind::Ejected { owner, age } => owner != player || age >= eject::SELF_PICKUP_DELAY,
            FoodKind::Pellet => true,
        }
    }

    pub fn validate(&self) -> Result<(), EntityError> {
        check_body(self.entity_kind(), self.position, self.radius, self.value)
    }
}

/// Virus: a growing hazard that shatters large cells
#[derive(Debug, Clone, Serialize)]
pub struct Virus {
    pub id: EntityId,
    pub position: Vec2,
    /// Drift velocity (non-zero only for freshly launched siblings)
    pub velocity: Vec2,
    pub(crate) mass: f32,
    pub(crate) radius: f32,
    pub growth_stage: u32,
    /// Minimum eater radius that triggers a shatter
    pub split_threshold: f32,
    pub max_growth_stage: u32,
}

impl Virus {
    pub fn new(id: EntityId, position: Vec2) -> Self {
        let mut v = Self {
            id,
            position,
            velocity: Vec2::ZERO,
            mass: 0.0,
            radius: 0.0,
            growth_stage: 1,
            split_threshold: 0.0,
            max_growth_stage: virus::MAX_GROWTH_STAGE,
        };
        v.reset();
        v
    }

    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn validate(&self) -> Result<(), EntityError> {
        check_body(EntityKind::Virus, self.position, self.radius, self.mass)
    }
}

/// Collectible power-up
#[derive(Debug, Clone, Serialize)]
pub struct PowerUp {
    pub id: EntityId,
    pub position: Vec2,
    pub kind: PowerUpType,
    /// Seconds of effect granted on pickup
    pub duration: f32,
}

impl PowerUp {
    pub fn new(id: EntityId, position: Vec2, kind: PowerUpType) -> Self {
        Self {
            id,
            position,
            kind,
            duration: kind.duration(),
        }
    }

    pub fn radius(&self) -> f32 {
        power_up::RADIUS
    }

    pub fn validate(&self) -> Result<(), EntityError> {
        check_body(EntityKind::PowerUp, self.position, power_up::RADIUS, self.duration)
    }
}

/// Virus waiting to be spawned by the world
#[derive(Debug, Clone, Copy)]
pub struct PendingVirus {
    /// Spawn position; `None` picks a random position
    pub position: Option<Vec2>,
    pub velocity: Vec2,
    /// Seconds until the spawn happens
    pub delay: f32,
}

/// Axis-aligned world rectangle anchored at the origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width * 0.5, self.height * 0.5)
    }

    /// Clamp a circle so it lies fully inside the world (or centered if it cannot)
    pub fn clamp_circle(&self, position: Vec2, radius: f32) -> Vec2 {
        let r_x = radius.min(self.width * 0.5);
        let r_y = radius.min(self.height * 0.5);
        position.clamp(
            Vec2::new(r_x, r_y),
            Vec2::new(self.width - r_x, self.height - r_y),
        )
    }

    pub fn contains(&self, position: Vec2) -> bool {
        position.x >= 0.0 && position.y >= 0.0 && position.x <= self.width && position.y <= self.height
    }

    pub fn random_point(&self, rng: &mut impl Rng, margin: f32) -> Vec2 {
        let mx = margin.min(self.width * 0.5 - 1.0).max(0.0);
        let my = margin.min(self.height * 0.5 - 1.0).max(0.0);
        Vec2::new(
            rng.gen_range(mx..=(self.width - mx)),
            rng.gen_range(my..=(self.height - my)),
        )
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new(world_consts::DEFAULT_WIDTH, world_consts::DEFAULT_HEIGHT)
    }
}

/// Leaderboard row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub id: PlayerId,
    pub name: String,
    pub mass: f32,
    pub score: f32,
}

/// The world: owns every entity collection
#[derive(Debug)]
pub struct World {
    pub tick: u64,
    /// Simulated seconds elapsed
    pub time: f64,
    pub bounds: Bounds,
    pub(crate) players: FxHashMap<PlayerId, Player>,
    pub food: Vec<Food>,
    pub viruses: Vec<Virus>,
    pub power_ups: Vec<PowerUp>,
    pub(crate) pending_viruses: Vec<PendingVirus>,
    pub(crate) rng: StdRng,
    next_player_id: PlayerId,
    next_entity_id: EntityId,
}

impl World {
    pub fn new(bounds: Bounds, seed: u64) -> Self {
        Self {
            tick: 0,
            time: 0.0,
            bounds,
            players: FxHashMap::default(),
            food: Vec::new(),
            viruses: Vec::new(),
            power_ups: Vec::new(),
            pending_viruses: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            next_player_id: 1,
            next_entity_id: 1,
        }
    }

    /// Generate a new unique entity ID
    pub fn next_entity_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn get_player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub(crate) fn get_player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Player ids in ascending order (stable processing order)
    pub fn player_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.players.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Spawn a player with one starting cell at a random position
    pub fn spawn_player(&mut self, name: impl Into<String>, is_ai: bool) -> PlayerId {
        let position = self.bounds.random_point(&mut self.rng, world_consts::SPAWN_MARGIN);
        self.spawn_player_at(name, is_ai, position, mass::STARTING)
    }

    /// Spawn a player with one cell of `mass` at `position`
    pub fn spawn_player_at(
        &mut self,
        name: impl Into<String>,
        is_ai: bool,
        position: Vec2,
        mass: f32,
    ) -> PlayerId {
        let id = self.next_player_id;
        self.next_player_id += 1;

        let color = Color::random(&mut self.rng);
        let mut player = Player::new(id, name.into(), is_ai, color);
        player.add_cell(Cell::new(id, position, mass, color));
        player.aim = position;
        player.last_center = position;
        player.update_score();
        self.players.insert(id, player);

        tracing::debug!(player = id, is_ai, x = position.x, y = position.y, "player spawned");
        id
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        self.players.remove(&id)
    }

    /// Point a player's cells at a world-space target with full drive
    pub fn set_aim(&mut self, id: PlayerId, target: Vec2) -> bool {
        if !target.is_finite() {
            return false;
        }
        match self.players.get_mut(&id) {
            Some(player) => {
                player.aim = target;
                player.drive = 1.0;
                true
            }
            None => false,
        }
    }

    pub fn add_food(&mut self, position: Vec2, value: f32) -> EntityId {
        let id = self.next_entity_id();
        let color = Color::random(&mut self.rng);
        self.food.push(Food::pellet(id, position, value, color));
        id
    }

    pub fn add_random_food(&mut self) -> EntityId {
        let position = self.bounds.random_point(&mut self.rng, food::RADIUS);
        let value = self.rng.gen_range(food::MIN_VALUE..=food::MAX_VALUE);
        self.add_food(position, value)
    }

    pub fn add_virus(&mut self, position: Vec2) -> EntityId {
        let id = self.next_entity_id();
        self.viruses.push(Virus::new(id, position));
        id
    }

    pub fn add_power_up(&mut self, position: Vec2, kind: PowerUpType) -> EntityId {
        let id = self.next_entity_id();
        self.power_ups.push(PowerUp::new(id, position, kind));
        id
    }

    /// Queue a virus spawn handled by the spawn policy
    pub fn schedule_virus(&mut self, position: Option<Vec2>, velocity: Vec2, delay: f32) {
        self.pending_viruses.push(PendingVirus {
            position,
            velocity,
            delay,
        });
    }

    pub fn pending_virus_count(&self) -> usize {
        self.pending_viruses.len()
    }

    pub fn total_cells(&self) -> usize {
        self.players.values().map(|p| p.cells.len()).sum()
    }

    pub fn entity_count(&self) -> usize {
        self.total_cells() + self.food.len() + self.viruses.len() + self.power_ups.len()
    }

    /// Top players by current mass
    pub fn leaderboard(&self, limit: usize) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = self
            .players
            .values()
            .filter(|p| !p.is_eliminated())
            .map(|p| LeaderboardEntry {
                id: p.id,
                name: p.name.clone(),
                mass: p.total_mass(),
                score: p.score,
            })
            .collect();
        entries.sort_by(|a, b| b.mass.total_cmp(&a.mass).then_with(|| a.id.cmp(&b.id)));
        entries.truncate(limit);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_cell_mass_radius_invariant() {
        let mut cell = Cell::new(1, Vec2::ZERO, PI * 1600.0, Color::VIRUS);
        assert!((cell.radius() - 40.0).abs() < 0.001);

        cell.add_mass(50.0);
        let expected = (cell.mass() / PI).sqrt();
        assert!((cell.radius() - expected).abs() < 1e-4);
    }

    #[test]
    fn test_cell_merge_cooldown() {
        let mut cell = Cell::new(1, Vec2::ZERO, 200.0, Color::VIRUS);
        assert!(cell.can_merge);
        cell.start_merge_cooldown();
        assert!(!cell.can_merge);
        assert_eq!(cell.merge_timer, merge::COOLDOWN);
    }

    #[test]
    fn test_cell_validate() {
        let mut cell = Cell::new(1, Vec2::new(10.0, 10.0), 200.0, Color::VIRUS);
        assert!(cell.validate().is_ok());

        cell.position.x = f32::NAN;
        assert!(matches!(cell.validate(), Err(EntityError::NonFinitePosition { .. })));

        cell.position.x = 0.0;
        cell.set_mass(f32::INFINITY);
        assert!(cell.validate().is_err());
    }

    #[test]
    fn test_player_center_is_mass_weighted() {
        let mut player = Player::new(1, "p".into(), false, Color::VIRUS);
        player.add_cell(Cell::new(1, Vec2::new(0.0, 0.0), 300.0, Color::VIRUS));
        player.add_cell(Cell::new(1, Vec2::new(100.0, 0.0), 100.0, Color::VIRUS));

        let center = player.center();
        assert!((center.x - 25.0).abs() < 0.001);
        assert!((player.total_mass() - 400.0).abs() < 0.001);
    }

    #[test]
    fn test_player_empty_center_falls_back() {
        let mut player = Player::new(1, "p".into(), false, Color::VIRUS);
        player.last_center = Vec2::new(7.0, 8.0);
        assert_eq!(player.center(), Vec2::new(7.0, 8.0));
        assert!(player.is_eliminated());
    }

    #[test]
    fn test_score_tracks_peak_mass() {
        let mut player = Player::new(1, "p".into(), false, Color::VIRUS);
        player.add_cell(Cell::new(1, Vec2::ZERO, 400.0, Color::VIRUS));
        player.update_score();
        player.cells[0].set_mass(100.0);
        player.update_score();
        assert_eq!(player.score, 400.0);
    }

    #[test]
    fn test_effects_grant_and_expire() {
        let mut effects = ActiveEffects::default();
        assert!(effects.grant(PowerUpType::Speed, 1.0));
        assert!(!effects.grant(PowerUpType::Speed, 1.0));
        assert!((effects.remaining(PowerUpType::Speed) - 2.0).abs() < 1e-6);

        assert!(effects.tick(1.5).is_empty());
        let expired = effects.tick(1.0);
        assert_eq!(expired.as_slice(), &[PowerUpType::Speed]);
        assert!(!effects.is_active(PowerUpType::Speed));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_ejected_food_self_pickup_delay() {
        let mut food = Food::ejected(1, 7, Vec2::ZERO, Vec2::ZERO, Color::VIRUS);
        assert!(!food.edible_by(7));
        assert!(food.edible_by(8));
        food.kind = FoodKind::Ejected {
            owner: 7,
            age: eject::SELF_PICKUP_DELAY,
        };
        assert!(food.edible_by(7));
        assert_eq!(food.entity_kind(), EntityKind::EjectedMass);
    }

    #[test]
    fn test_bounds_clamp_circle() {
        let bounds = Bounds::new(100.0, 100.0);
        let p = bounds.clamp_circle(Vec2::new(-10.0, 120.0), 5.0);
        assert_eq!(p, Vec2::new(5.0, 95.0));
    }

    #[test]
    fn test_world_spawn_and_remove_player() {
        let mut world = World::new(Bounds::default(), 42);
        let id = world.spawn_player("Alice", false);

        let player = world.get_player(id).unwrap();
        assert_eq!(player.cells().len(), 1);
        assert!((player.total_mass() - mass::STARTING).abs() < 0.001);
        assert!(world.bounds.contains(player.center()));

        assert!(world.remove_player(id).is_some());
        assert!(world.get_player(id).is_none());
    }

    #[test]
    fn test_world_entity_ids_unique() {
        let mut world = World::new(Bounds::default(), 1);
        let a = world.add_random_food();
        let b = world.add_virus(Vec2::new(100.0, 100.0));
        let c = world.add_power_up(Vec2::new(200.0, 200.0), PowerUpType::Shield);
        assert!(a != b && b != c && a != c);
    }

    #[test]
    fn test_set_aim_rejects_non_finite() {
        let mut world = World::new(Bounds::default(), 1);
        let id = world.spawn_player("Carol", false);
        assert!(!world.set_aim(id, Vec2::new(f32::NAN, 0.0)));
        assert!(world.set_aim(id, Vec2::new(10.0, 10.0)));
        assert_eq!(world.get_player(id).unwrap().drive, 1.0);
    }

    #[test]
    fn test_leaderboard_sorted_by_mass() {
        let mut world = World::new(Bounds::default(), 1);
        let small = world.spawn_player_at("small", false, Vec2::new(100.0, 100.0), 200.0);
        let big = world.spawn_player_at("big", false, Vec2::new(900.0, 900.0), 900.0);

        let board = world.leaderboard(10);
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].id, big);
        assert_eq!(board[1].id, small);
    }

    #[test]
    fn test_color_display() {
        assert_eq!(Color::rgb(0xFF, 0x00, 0x7F).to_string(), "#FF007F");
    }
}
