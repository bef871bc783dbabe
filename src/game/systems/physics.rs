use crate::game::constants::physics::{
    DAMPING, DEFAULT_DT, FREE_BODY_FRICTION, FREE_BODY_REST_SPEED, MAX_INTEGRATION_DT, REST_SPEED,
    STEERING_DEADZONE, STEERING_FORCE,
};
use crate::game::constants::{mass_effect, power_up, speed, speed_multiplier};
use crate::game::state::{Cell, FoodKind, Player, PowerUpType, World};
use crate::util::vec2::Vec2;

/// Clamp a delta time into `(0, MAX_INTEGRATION_DT]`, substituting 1/60 for
/// NaN, infinite or non-positive input
#[inline]
pub fn sanitize_dt(dt: f32) -> f32 {
    if dt.is_finite() && dt > 0.0 {
        dt.min(MAX_INTEGRATION_DT)
    } else {
        DEFAULT_DT
    }
}

/// Allowed speed range for a cell of `mass`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedBand {
    pub min: f32,
    pub max: f32,
}

impl SpeedBand {
    pub fn for_mass(mass: f32, boost: f32) -> Self {
        let multiplier = speed_multiplier(mass);
        Self {
            min: speed::BASE_MIN * multiplier,
            max: speed::BASE_MAX * multiplier * boost,
        }
    }
}

/// Integrate one cell
///
/// Order: force → damping → speed band → position, then the accumulated
/// force is zeroed. `driven` cells are held at the band minimum; idle
/// cells below `REST_SPEED` come to rest instead.
pub fn integrate_cell(cell: &mut Cell, dt: f32, driven: bool, boost: f32) {
    let dt = sanitize_dt(dt);

    cell.velocity += cell.force / mass_effect(cell.mass()) * dt;
    cell.velocity *= DAMPING;

    let band = SpeedBand::for_mass(cell.mass(), boost);
    let speed = cell.velocity.length();
    if speed > band.max {
        cell.velocity *= band.max / speed;
    } else if driven && speed > f32::EPSILON && speed < band.min {
        cell.velocity *= band.min / speed;
    } else if !driven && speed < REST_SPEED {
        cell.velocity = Vec2::ZERO;
    }

    cell.position += cell.velocity * dt;
    cell.force = Vec2::ZERO;

    if cell.position.is_finite() && cell.velocity.is_finite() {
        cell.last_valid_position = cell.position;
    } else {
        tracing::debug!(owner = cell.owner, "non-finite cell state, restoring last valid position");
        cell.position = cell.last_valid_position;
        cell.velocity = Vec2::ZERO;
    }
}

/// Push each cell toward the player's aim point. Returns per-cell "driven" flags.
fn apply_steering(player: &mut Player) -> smallvec::SmallVec<[bool; 16]> {
    let aim = player.aim;
    let drive = if player.drive.is_finite() {
        player.drive.clamp(0.0, 1.0)
    } else {
        0.0
    };

    player
        .cells
        .iter_mut()
        .map(|cell| {
            let (dir, distance) = (aim - cell.position).normalize_with_length();
            if drive > 0.0 && distance > STEERING_DEADZONE && aim.is_finite() {
                cell.apply_force(dir * (drive * STEERING_FORCE));
                true
            } else {
                false
            }
        })
        .collect()
}

/// Coast a free body (ejected mass, drifting virus) with friction
#[inline]
fn integrate_free_body(position: &mut Vec2, velocity: &mut Vec2, dt: f32) {
    if *velocity == Vec2::ZERO {
        return;
    }
    *position += *velocity * dt;
    *velocity *= FREE_BODY_FRICTION;
    if velocity.length_sq() < FREE_BODY_REST_SPEED * FREE_BODY_REST_SPEED || !velocity.is_finite() {
        *velocity = Vec2::ZERO;
    }
}

/// Update physics for every entity in the world
pub fn update(world: &mut World, dt: f32) {
    let dt = sanitize_dt(dt);

    for player in world.players.values_mut() {
        let driven = apply_steering(player);
        let boost = if player.has_effect(PowerUpType::Speed) {
            power_up::SPEED_MULTIPLIER
        } else {
            1.0
        };
        for (cell, driven) in player.cells.iter_mut().zip(driven) {
            integrate_cell(cell, dt, driven, boost);
        }
    }

    for food in world.food.iter_mut() {
        if let FoodKind::Ejected { age, .. } = &mut food.kind {
            *age += dt;
        }
        integrate_free_body(&mut food.position, &mut food.velocity, dt);
    }

    for virus in world.viruses.iter_mut() {
        integrate_free_body(&mut virus.position, &mut virus.velocity, dt);
    }
}
