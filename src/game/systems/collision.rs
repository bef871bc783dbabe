//! Collision detection and resolution
//!
//! Every player's cells are moved out into one flat body list, the passes run
//! over that list with alive flags, and survivors are written back to their
//! owners at the end. Removals are never applied mid-scan.
//!
//! Pass order: cell↔food, cell↔cell (cross-player), cell↔virus,
//! cell↔power-up, ejected-mass↔virus.

use rand::Rng;
use serde::Serialize;
use tracing::{info, trace, warn};

use crate::game::constants::{collision, mass_to_radius, power_up, split, virus, world as world_consts};
use crate::game::events::{
    EventBus, GameEvent, PlayerEliminated, PowerUpCollected, VirusGrew, VirusSplit,
};
use crate::game::spatial::{SpatialEntity, SpatialEntityId, SpatialGrid};
use crate::game::state::{Cell, PlayerId, PowerUpType, World};
use crate::game::systems::virus::GrowthOutcome;
use crate::util::vec2::Vec2;

/// Per-tick collision counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollisionStats {
    pub food_eaten: u32,
    pub cells_eaten: u32,
    pub bounces: u32,
    pub viruses_popped: u32,
    pub power_ups_collected: u32,
    pub viruses_fed: u32,
    pub entities_dropped: u32,
    pub players_eliminated: u32,
}

/// Outcome of two overlapping cells from different players
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contest {
    FirstEats,
    SecondEats,
    Bounce,
}

/// Decide who eats whom. A shield on either side always bounces.
pub fn contest(first_mass: f32, second_mass: f32, shielded: bool) -> Contest {
    if shielded {
        Contest::Bounce
    } else if first_mass >= second_mass * collision::EAT_RATIO {
        Contest::FirstEats
    } else if second_mass >= first_mass * collision::EAT_RATIO {
        Contest::SecondEats
    } else {
        Contest::Bounce
    }
}

/// Fraction of the eaten mass that reaches the eater; grows with disparity
#[inline]
pub fn eat_efficiency(ratio: f32) -> f32 {
    let excess = (ratio - collision::EAT_RATIO).max(0.0);
    (collision::BASE_EFFICIENCY + excess * collision::EFFICIENCY_SLOPE).min(collision::MAX_EFFICIENCY)
}

/// Mass-weighted impulse along the contact normal, then positional
/// correction so the pair no longer interpenetrates
pub fn resolve_bounce(a: &mut Cell, b: &mut Cell) {
    let (normal, dist) = (b.position - a.position).normalize_with_length();
    let normal = if dist > f32::EPSILON {
        normal
    } else {
        // Coincident centers: separate along a fixed axis
        Vec2::RIGHT
    };

    let approach = (b.velocity - a.velocity).dot(normal);
    if approach < 0.0 {
        let inv_a = 1.0 / a.mass();
        let inv_b = 1.0 / b.mass();
        let j = -(1.0 + collision::RESTITUTION) * approach / (inv_a + inv_b);
        a.velocity -= normal * (j * inv_a);
        b.velocity += normal * (j * inv_b);
    }

    separate(a, b, normal, dist);
}

/// Push an overlapping pair apart along `normal`, split by inverse mass.
/// Returns whether the pair was still overlapping.
fn separate(a: &mut Cell, b: &mut Cell, normal: Vec2, dist: f32) -> bool {
    let overlap = a.radius() + b.radius() - dist;
    if overlap <= collision::CONTACT_SLOP {
        return false;
    }
    let inv_a = 1.0 / a.mass();
    let inv_b = 1.0 / b.mass();
    let inv_sum = inv_a + inv_b;
    a.position -= normal * (overlap * inv_a / inv_sum);
    b.position += normal * (overlap * inv_b / inv_sum);
    true
}

/// Repeat positional correction over bounced pairs so a cluster settles
/// without leaving earlier pairs overlapping
fn relax_contacts(bodies: &mut [Body], contacts: &[(usize, usize)]) {
    for _ in 0..collision::RELAXATION_ITERATIONS {
        let mut moved = false;
        for &(i, j) in contacts {
            let (a, b) = pair_mut(bodies, i, j);
            if !a.alive || !b.alive {
                continue;
            }
            let (normal, dist) = (b.cell.position - a.cell.position).normalize_with_length();
            let normal = if dist > f32::EPSILON { normal } else { Vec2::RIGHT };
            moved |= separate(&mut a.cell, &mut b.cell, normal, dist);
        }
        if !moved {
            break;
        }
    }
}

#[derive(Debug, Clone)]
struct Body {
    cell: Cell,
    alive: bool,
}

/// Borrow two distinct bodies mutably
fn pair_mut(bodies: &mut [Body], a: usize, b: usize) -> (&mut Body, &mut Body) {
    debug_assert!(a != b);
    if a < b {
        let (left, right) = bodies.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = bodies.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

fn has_shield(world: &World, owner: PlayerId) -> bool {
    world
        .get_player(owner)
        .is_some_and(|p| p.has_effect(PowerUpType::Shield))
}

/// Remove every entry whose flag is set
fn retain_unflagged<T>(items: &mut Vec<T>, flags: &[bool]) {
    let mut idx = 0;
    items.retain(|_| {
        let keep = !flags.get(idx).copied().unwrap_or(false);
        idx += 1;
        keep
    });
}

/// Collision resolver with reusable scratch buffers
#[derive(Debug, Default)]
pub struct CollisionResolver {
    food_grid: SpatialGrid,
    cell_grid: SpatialGrid,
    bodies: Vec<Body>,
    contacts: Vec<(usize, usize)>,
}

impl CollisionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every collision pass once
    pub fn resolve(&mut self, world: &mut World, events: &mut EventBus) -> CollisionStats {
        let mut stats = CollisionStats::default();

        stats.entities_dropped += drop_malformed(world);
        self.collect_bodies(world, &mut stats);

        self.food_pass(world, &mut stats);
        self.cell_pass(world, &mut stats);
        virus_pass(&mut self.bodies, world, &mut stats);
        power_up_pass(&mut self.bodies, world, events, &mut stats);
        ejected_virus_pass(world, events, &mut stats);

        self.write_back(world, events, &mut stats);
        stats
    }

    fn collect_bodies(&mut self, world: &mut World, stats: &mut CollisionStats) {
        self.bodies.clear();
        for id in world.player_ids() {
            let Some(player) = world.players.get_mut(&id) else {
                continue;
            };
            let center = player.center();
            if center.is_finite() && !player.cells.is_empty() {
                player.last_center = center;
            }
            // Only an eat during this pass names an eliminator
            player.last_attacker = None;
            for cell in player.cells.drain(..) {
                match cell.validate() {
                    Ok(()) => self.bodies.push(Body { cell, alive: true }),
                    Err(e) => {
                        warn!(player = id, error = %e, "dropping malformed cell");
                        stats.entities_dropped += 1;
                    }
                }
            }
        }
    }

    fn food_pass(&mut self, world: &mut World, stats: &mut CollisionStats) {
        let food = &mut world.food;
        self.food_grid.rebuild(food.iter().enumerate().map(|(i, f)| SpatialEntity {
            id: SpatialEntityId::Food(i),
            position: f.position,
            radius: f.radius,
        }));

        let mut eaten = vec![false; food.len()];
        for body in self.bodies.iter_mut().filter(|b| b.alive) {
            let owner = body.cell.owner;
            let (position, radius) = (body.cell.position, body.cell.radius());
            for entity in self.food_grid.query_overlapping(position, radius) {
                let SpatialEntityId::Food(i) = entity.id else {
                    continue;
                };
                if eaten[i] || !food[i].edible_by(owner) {
                    continue;
                }
                eaten[i] = true;
                body.cell.add_mass(food[i].value);
                stats.food_eaten += 1;
            }
        }

        retain_unflagged(food, &eaten);
    }

    fn cell_pass(&mut self, world: &mut World, stats: &mut CollisionStats) {
        let bodies = &mut self.bodies;
        self.cell_grid.rebuild(bodies.iter().enumerate().map(|(i, b)| SpatialEntity {
            id: SpatialEntityId::Cell(i),
            position: b.cell.position,
            radius: b.cell.radius(),
        }));
        self.contacts.clear();

        let mut candidates: Vec<usize> = Vec::new();
        for i in 0..bodies.len() {
            if !bodies[i].alive {
                continue;
            }
            candidates.clear();
            candidates.extend(
                self.cell_grid
                    .query_radius(bodies[i].cell.position, bodies[i].cell.radius())
                    .filter_map(|e| match e.id {
                        SpatialEntityId::Cell(j) if j > i => Some(j),
                        _ => None,
                    }),
            );
            // Bucket order is hash order; keep pair order stable
            candidates.sort_unstable();

            for &j in &candidates {
                if !bodies[i].alive {
                    break;
                }
                if !bodies[j].alive {
                    continue;
                }
                let (owner_i, owner_j) = (bodies[i].cell.owner, bodies[j].cell.owner);
                if owner_i == owner_j {
                    continue;
                }
                if !bodies[i].cell.overlaps(bodies[j].cell.position, bodies[j].cell.radius()) {
                    continue;
                }

                let shielded = has_shield(world, owner_i) || has_shield(world, owner_j);
                match contest(bodies[i].cell.mass(), bodies[j].cell.mass(), shielded) {
                    Contest::FirstEats => eat(bodies, i, j, world, stats),
                    Contest::SecondEats => eat(bodies, j, i, world, stats),
                    Contest::Bounce => {
                        let (a, b) = pair_mut(bodies, i, j);
                        resolve_bounce(&mut a.cell, &mut b.cell);
                        self.contacts.push((i, j));
                        stats.bounces += 1;
                    }
                }
            }
        }

        relax_contacts(bodies, &self.contacts);
    }

    fn write_back(&mut self, world: &mut World, events: &mut EventBus, stats: &mut CollisionStats) {
        for body in self.bodies.drain(..) {
            if !body.alive {
                continue;
            }
            if let Some(player) = world.players.get_mut(&body.cell.owner) {
                player.cells.push(body.cell);
            }
        }

        for id in world.player_ids() {
            let eliminated = world.get_player(id).is_some_and(|p| p.is_eliminated());
            if !eliminated {
                continue;
            }
            if let Some(player) = world.remove_player(id) {
                info!(
                    player = id,
                    name = %player.name,
                    eliminator = ?player.last_attacker,
                    score = player.score,
                    "player eliminated"
                );
                events.emit(GameEvent::PlayerEliminated(PlayerEliminated {
                    player: id,
                    position: player.last_center,
                    color: player.color,
                    eliminator: player.last_attacker,
                }));
                stats.players_eliminated += 1;
            }
        }
    }
}

/// Drop food, viruses and power-ups with non-finite or non-positive state
fn drop_malformed(world: &mut World) -> u32 {
    let mut dropped = 0;

    world.food.retain(|f| match f.validate() {
        Ok(()) => true,
        Err(e) => {
            warn!(food = f.id, error = %e, "dropping malformed food");
            dropped += 1;
            false
        }
    });
    world.viruses.retain(|v| match v.validate() {
        Ok(()) => true,
        Err(e) => {
            warn!(virus = v.id, error = %e, "dropping malformed virus");
            dropped += 1;
            false
        }
    });
    world.power_ups.retain(|p| match p.validate() {
        Ok(()) => true,
        Err(e) => {
            warn!(power_up = p.id, error = %e, "dropping malformed power-up");
            dropped += 1;
            false
        }
    });

    dropped
}

fn eat(bodies: &mut [Body], eater: usize, victim: usize, world: &mut World, stats: &mut CollisionStats) {
    let (eater, victim) = pair_mut(bodies, eater, victim);

    let ratio = eater.cell.mass() / victim.cell.mass();
    let transferred = victim.cell.mass() * eat_efficiency(ratio);
    eater.cell.add_mass(transferred);
    victim.alive = false;
    stats.cells_eaten += 1;

    let (eater_id, victim_id) = (eater.cell.owner, victim.cell.owner);
    if let Some(player) = world.get_player_mut(victim_id) {
        player.last_center = victim.cell.position;
        player.last_attacker = Some(eater_id);
    }
    trace!(eater = eater_id, victim = victim_id, transferred, "cell eaten");
}

fn virus_pass(bodies: &mut Vec<Body>, world: &mut World, stats: &mut CollisionStats) {
    let mut popped = vec![false; world.viruses.len()];

    for (vi, v) in world.viruses.iter().enumerate() {
        for bi in 0..bodies.len() {
            let body = &bodies[bi];
            if !body.alive || !body.cell.overlaps(v.position, v.radius()) || !v.can_split(&body.cell) {
                continue;
            }

            let owner = body.cell.owner;
            let owned = bodies.iter().filter(|b| b.alive && b.cell.owner == owner).count();
            let slots = (split::MAX_CELLS + 1).saturating_sub(owned);
            let pieces = ((body.cell.mass() / virus::SHATTER_MASS_UNIT).floor() as usize)
                .min(split::MAX_CELLS)
                .min(slots);

            if pieces < 2 {
                // No room to shatter: the virus is simply absorbed
                bodies[bi].cell.add_mass(v.mass());
            } else {
                shatter(bodies, bi, pieces, &mut world.rng);
            }

            popped[vi] = true;
            stats.viruses_popped += 1;
            trace!(virus = v.id, player = owner, pieces, "virus popped");
            break;
        }
    }

    let count = popped.iter().filter(|p| **p).count();
    retain_unflagged(&mut world.viruses, &popped);
    for _ in 0..count {
        world.schedule_virus(None, Vec2::ZERO, world_consts::VIRUS_RESPAWN_DELAY);
    }
}

/// Replace the body at `index` with `pieces` equal cells launched radially
fn shatter(bodies: &mut Vec<Body>, index: usize, pieces: usize, rng: &mut impl Rng) {
    let parent = bodies[index].cell.clone();
    let piece_mass = parent.mass() / pieces as f32;
    let piece_radius = mass_to_radius(piece_mass);
    let offset = rng.gen_range(0.0..std::f32::consts::TAU);

    for k in 0..pieces {
        let angle = offset + std::f32::consts::TAU * k as f32 / pieces as f32;
        let dir = Vec2::from_angle(angle);
        let mut piece = Cell::new(parent.owner, parent.position + dir * piece_radius, piece_mass, parent.color);
        piece.velocity = parent.velocity + dir * virus::SHATTER_LAUNCH_SPEED;
        piece.start_merge_cooldown();

        if k == 0 {
            bodies[index].cell = piece;
        } else {
            bodies.push(Body {
                cell: piece,
                alive: true,
            });
        }
    }
}

fn power_up_pass(bodies: &mut [Body], world: &mut World, events: &mut EventBus, stats: &mut CollisionStats) {
    let mut collected = vec![false; world.power_ups.len()];

    for (pi, pu) in world.power_ups.iter().enumerate() {
        let Some(owner) = bodies
            .iter()
            .find(|b| b.alive && b.cell.overlaps(pu.position, pu.radius()))
            .map(|b| b.cell.owner)
        else {
            continue;
        };
        collected[pi] = true;

        let Some(player) = world.players.get_mut(&owner) else {
            continue;
        };
        let newly_active = player.effects.grant(pu.kind, pu.duration);
        if pu.kind == PowerUpType::MassBoost && newly_active {
            for body in bodies.iter_mut().filter(|b| b.alive && b.cell.owner == owner) {
                let boosted = body.cell.mass() * power_up::MASS_BOOST_FACTOR;
                body.cell.set_mass(boosted);
            }
        }

        events.emit(GameEvent::PowerUpCollected(PowerUpCollected {
            player: owner,
            position: pu.position,
            color: pu.kind.color(),
            kind: pu.kind,
        }));
        stats.power_ups_collected += 1;
        trace!(player = owner, kind = ?pu.kind, "power-up collected");
    }

    retain_unflagged(&mut world.power_ups, &collected);
}

fn ejected_virus_pass(world: &mut World, events: &mut EventBus, stats: &mut CollisionStats) {
    let mut fed = vec![false; world.food.len()];
    let mut siblings: Vec<(Vec2, Vec2)> = Vec::new();

    for (fi, food) in world.food.iter().enumerate() {
        if !food.is_ejected() {
            continue;
        }
        let Some(v) = world.viruses.iter_mut().find(|v| {
            let reach = v.radius() + food.radius;
            v.position.distance_sq_to(food.position) < reach * reach
        }) else {
            continue;
        };

        fed[fi] = true;
        stats.viruses_fed += 1;
        match v.grow(&mut world.rng) {
            GrowthOutcome::Grew { stage } => {
                events.emit(GameEvent::VirusGrew(VirusGrew {
                    virus: v.id,
                    position: v.position,
                    stage,
                }));
            }
            GrowthOutcome::Split { position, velocity } => {
                events.emit(GameEvent::VirusSplit(VirusSplit { position, velocity }));
                siblings.push((position, velocity));
            }
        }
    }

    retain_unflagged(&mut world.food, &fed);
    for (position, velocity) in siblings {
        world.schedule_virus(Some(position), velocity, 0.0);
    }
}
