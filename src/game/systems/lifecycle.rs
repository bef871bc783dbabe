//! Cell lifecycle: split, eject, merge, and the timers that gate them
//!
//! Split and eject are player commands (human input or AI sub-actions) and
//! share one cooldown per player. Merge, timer decay and own-cell separation
//! run once per tick from [`update`].

use smallvec::SmallVec;

use crate::game::constants::{eject, mass as mass_consts, merge, power_up, split};
use crate::game::events::{CellMerge, EjectedMassCreated, EventBus, GameEvent};
use crate::game::state::{Cell, Food, Player, PlayerId, PowerUpType, World};
use crate::util::vec2::Vec2;

/// Why a split or eject command was refused
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandRejected {
    #[error("player {0} not found")]
    PlayerMissing(PlayerId),
    #[error("split on cooldown ({remaining:.2}s left)")]
    SplitCooldown { remaining: f32 },
    #[error("eject on cooldown ({remaining:.2}s left)")]
    EjectCooldown { remaining: f32 },
    #[error("cell limit of {max} reached")]
    CellLimit { max: usize },
}

/// Direction from a cell toward the aim point, with a stable fallback when
/// the aim sits on the cell center
fn aim_direction(aim: Vec2, cell: &Cell) -> Vec2 {
    let fallback = cell.velocity.normalize_or(Vec2::RIGHT);
    if !aim.is_finite() {
        return fallback;
    }
    (aim - cell.position).normalize_or(fallback)
}

/// Split every eligible cell of a player in two
///
/// Cells are visited largest first; a cell needs `2 × split::MIN_MASS` to
/// split. Stops once the cell cap is reached. Returns the number of children.
pub fn split_player(player: &mut Player) -> Result<usize, CommandRejected> {
    if player.split_cooldown > 0.0 {
        return Err(CommandRejected::SplitCooldown {
            remaining: player.split_cooldown,
        });
    }
    if player.cells.len() >= split::MAX_CELLS {
        return Err(CommandRejected::CellLimit {
            max: split::MAX_CELLS,
        });
    }

    let available = split::MAX_CELLS - player.cells.len();
    let mut order: SmallVec<[usize; split::MAX_CELLS]> = (0..player.cells.len()).collect();
    order.sort_by(|&a, &b| player.cells[b].mass().total_cmp(&player.cells[a].mass()));

    let aim = player.aim;
    let mut children: SmallVec<[Cell; split::MAX_CELLS]> = SmallVec::new();

    for idx in order {
        if children.len() >= available {
            break;
        }
        let parent = &mut player.cells[idx];
        if parent.mass() < 2.0 * split::MIN_MASS {
            continue;
        }

        let dir = aim_direction(aim, parent);
        let half = parent.mass() * 0.5;
        parent.set_mass(half);
        parent.start_merge_cooldown();

        let mut child = Cell::new(
            parent.owner,
            parent.position + dir * (parent.radius() * 2.0),
            half,
            parent.color,
        );
        child.velocity = parent.velocity + dir * (split::BOOST_PER_RADIUS * child.radius());
        child.start_merge_cooldown();
        children.push(child);
    }

    let created = children.len();
    if created > 0 {
        player.cells.extend(children);
        player.split_cooldown = split::COOLDOWN;
        tracing::trace!(player = player.id, created, cells = player.cells.len(), "split");
    }
    Ok(created)
}

/// Split command addressed by player id
pub fn split(world: &mut World, player_id: PlayerId) -> Result<usize, CommandRejected> {
    let player = world
        .get_player_mut(player_id)
        .ok_or(CommandRejected::PlayerMissing(player_id))?;
    split_player(player)
}

/// Eject a small pellet of mass from every cell above `eject::MIN_MASS`
///
/// The pellet leaves the cell boundary along the aim direction; the cell gets
/// a fixed recoil force. Returns the number of pellets created.
pub fn eject(world: &mut World, player_id: PlayerId, events: &mut EventBus) -> Result<usize, CommandRejected> {
    let player = world
        .get_player_mut(player_id)
        .ok_or(CommandRejected::PlayerMissing(player_id))?;
    if player.eject_cooldown > 0.0 {
        return Err(CommandRejected::EjectCooldown {
            remaining: player.eject_cooldown,
        });
    }

    let aim = player.aim;
    let color = player.color;
    let mut launches: SmallVec<[(Vec2, Vec2); split::MAX_CELLS]> = SmallVec::new();

    for cell in player.cells.iter_mut() {
        if cell.mass() <= eject::MIN_MASS {
            continue;
        }
        let dir = aim_direction(aim, cell);
        cell.set_mass((cell.mass() - eject::MASS).max(mass_consts::MINIMUM));
        cell.apply_force(-dir * eject::RECOIL_FORCE);
        launches.push((cell.position + dir * cell.radius(), dir * eject::SPEED));
    }

    if !launches.is_empty() {
        player.eject_cooldown = eject::COOLDOWN;
    }

    let count = launches.len();
    for (position, velocity) in launches {
        let id = world.next_entity_id();
        let food = Food::ejected(id, player_id, position, velocity, color);
        events.emit(GameEvent::EjectedMassCreated(EjectedMassCreated {
            player: player_id,
            position,
            velocity,
            radius: food.radius,
            color,
        }));
        world.food.push(food);
    }
    Ok(count)
}

/// Whether two of a player's own cells overlap enough to fuse
#[inline]
pub fn should_merge(a: &Cell, b: &Cell) -> bool {
    if !(a.can_merge && b.can_merge) {
        return false;
    }
    let threshold = a.radius() + b.radius() - a.radius().min(b.radius()) * merge::OVERLAP_FACTOR;
    a.position.distance_to(b.position) < threshold
}

/// Fuse every mergeable pair of the player's cells
///
/// The pair scan restarts after each merge, so no pair is skipped after a
/// removal shifts indices and no removed cell is read again.
pub fn merge_cells(player: &mut Player, events: &mut EventBus) -> usize {
    let mut merges = 0;

    'scan: loop {
        let len = player.cells.len();
        for i in 0..len {
            for j in (i + 1)..len {
                if !should_merge(&player.cells[i], &player.cells[j]) {
                    continue;
                }

                let (keep, gone) = if player.cells[i].mass() >= player.cells[j].mass() {
                    (i, j)
                } else {
                    (j, i)
                };
                let absorbed = player.cells.remove(gone);
                let keep = if gone < keep { keep - 1 } else { keep };
                let survivor = &mut player.cells[keep];

                let total = survivor.mass() + absorbed.mass();
                survivor.position =
                    (survivor.position * survivor.mass() + absorbed.position * absorbed.mass()) / total;
                survivor.velocity =
                    (survivor.velocity * survivor.mass() + absorbed.velocity * absorbed.mass()) / total;
                survivor.set_mass(total);
                survivor.last_valid_position = survivor.position;

                events.emit(GameEvent::CellMerge(CellMerge {
                    player: player.id,
                    position: survivor.position,
                    absorbed_position: absorbed.position,
                    color: survivor.color,
                }));
                merges += 1;
                continue 'scan;
            }
        }
        break;
    }

    merges
}

/// Count down merge timers; a cell may merge again once its timer hits zero
pub fn update_merge_timers(player: &mut Player, dt: f32) {
    for cell in player.cells.iter_mut() {
        if cell.can_merge {
            continue;
        }
        cell.merge_timer = (cell.merge_timer - dt).max(0.0);
        if cell.merge_timer <= 0.0 {
            cell.can_merge = true;
        }
    }
}

/// Count down split/eject cooldowns
pub fn update_cooldowns(player: &mut Player, dt: f32) {
    player.split_cooldown = (player.split_cooldown - dt).max(0.0);
    player.eject_cooldown = (player.eject_cooldown - dt).max(0.0);
}

/// Count down active effects and undo mass boosts that expired
pub fn update_effects(player: &mut Player, dt: f32) {
    for expired in player.effects.tick(dt) {
        if expired == PowerUpType::MassBoost {
            for cell in player.cells.iter_mut() {
                let restored = cell.mass() / power_up::MASS_BOOST_FACTOR;
                cell.set_mass(restored);
            }
        }
        tracing::trace!(player = player.id, effect = ?expired, "effect expired");
    }
}

/// Push apart a player's overlapping cells that are not yet allowed to merge
pub fn separate_own_cells(player: &mut Player) {
    let len = player.cells.len();
    for i in 0..len {
        for j in (i + 1)..len {
            let (a, b) = (&player.cells[i], &player.cells[j]);
            if a.can_merge && b.can_merge {
                continue;
            }
            let min_dist = a.radius() + b.radius();
            let (normal, dist) = (b.position - a.position).normalize_with_length();
            if dist >= min_dist || dist <= 0.01 {
                continue;
            }

            let overlap = min_dist - dist;
            let total = a.mass() + b.mass();
            let push_a = overlap * (b.mass() / total);
            let push_b = overlap * (a.mass() / total);
            player.cells[i].position -= normal * push_a;
            player.cells[j].position += normal * push_b;
        }
    }
}

/// Per-tick lifecycle pass for every player
pub fn update(world: &mut World, dt: f32, events: &mut EventBus) {
    for id in world.player_ids() {
        let Some(player) = world.get_player_mut(id) else {
            continue;
        };
        update_cooldowns(player, dt);
        update_effects(player, dt);
        update_merge_timers(player, dt);
        merge_cells(player, events);
        separate_own_cells(player);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Bounds, Color, FoodKind};
    use std::f32::consts::PI;

    const EPS: f32 = 0.01;

    fn player_with(masses: &[f32]) -> Player {
        let mut player = Player::new(1, "p".into(), false, Color::VIRUS);
        for (i, m) in masses.iter().enumerate() {
            player.add_cell(Cell::new(1, Vec2::new(1000.0 + i as f32 * 300.0, 1000.0), *m, Color::VIRUS));
        }
        player.aim = Vec2::new(5000.0, 1000.0);
        player
    }

    #[test]
    fn test_split_single_cell() {
        let mut player = player_with(&[2000.0]);

        let created = split_player(&mut player).unwrap();

        assert_eq!(created, 1);
        assert_eq!(player.cells.len(), 2);
        for cell in player.cells() {
            assert!((cell.mass() - 1000.0).abs() < EPS);
            assert!(!cell.can_merge);
            assert_eq!(cell.merge_timer, merge::COOLDOWN);
        }
        // Child launched toward the aim point
        assert!(player.cells[1].position.x > player.cells[0].position.x);
        assert!(player.cells[1].velocity.x > 0.0);
    }

    #[test]
    fn test_split_conserves_mass() {
        let mut player = player_with(&[900.0, 450.0, 150.0]);
        let before = player.total_mass();
        let count_before = player.cells.len();

        let created = split_player(&mut player).unwrap();

        assert_eq!(created, 2, "only cells with >= 200 mass split");
        assert_eq!(player.cells.len(), count_before + created);
        assert!((player.total_mass() - before).abs() < EPS);
    }

    #[test]
    fn test_split_largest_first_until_cap() {
        let masses: Vec<f32> = (0..14).map(|i| 300.0 + i as f32 * 10.0).collect();
        let mut player = player_with(&masses);

        let created = split_player(&mut player).unwrap();

        assert_eq!(created, 2);
        assert_eq!(player.cells.len(), split::MAX_CELLS);
        // The two largest (430, 420) are the halved ones
        let halved: Vec<f32> = player.cells[..14]
            .iter()
            .filter(|c| !c.can_merge)
            .map(|c| c.mass())
            .collect();
        assert_eq!(halved.len(), 2);
        assert!(halved.iter().all(|m| (*m - 215.0).abs() < EPS || (*m - 210.0).abs() < EPS));
    }

    #[test]
    fn test_split_cooldown_rejects() {
        let mut player = player_with(&[4000.0]);
        split_player(&mut player).unwrap();

        let err = split_player(&mut player).unwrap_err();
        assert!(matches!(err, CommandRejected::SplitCooldown { .. }));

        update_cooldowns(&mut player, split::COOLDOWN);
        assert!(split_player(&mut player).is_ok());
    }

    #[test]
    fn test_split_at_cell_limit_rejected() {
        let masses = vec![500.0; split::MAX_CELLS];
        let mut player = player_with(&masses);
        assert_eq!(
            split_player(&mut player),
            Err(CommandRejected::CellLimit { max: split::MAX_CELLS })
        );
    }

    #[test]
    fn test_split_with_aim_on_center_uses_fallback() {
        let mut player = player_with(&[1000.0]);
        player.aim = player.cells[0].position;

        split_player(&mut player).unwrap();

        let offset = player.cells[1].position - player.cells[0].position;
        assert!(offset.is_finite());
        assert!(offset.length() > 0.0);
    }

    #[test]
    fn test_eject_spawns_food_and_recoils() {
        let mut world = World::new(Bounds::default(), 5);
        let id = world.spawn_player_at("p", false, Vec2::new(1000.0, 1000.0), 500.0);
        world.set_aim(id, Vec2::new(2000.0, 1000.0));
        let mut events = EventBus::new();

        let count = eject(&mut world, id, &mut events).unwrap();

        assert_eq!(count, 1);
        let player = world.get_player(id).unwrap();
        assert!((player.total_mass() - (500.0 - eject::MASS)).abs() < EPS);
        assert!(player.cells[0].force.x < 0.0, "recoil points away from the aim");

        let food = world.food.last().unwrap();
        assert!(matches!(food.kind, FoodKind::Ejected { owner, .. } if owner == id));
        assert!(food.velocity.x > 0.0);
        assert!((food.position.x - (1000.0 + player.cells[0].radius())).abs() < 0.5);
        assert_eq!(events.pending().len(), 1);
        assert_eq!(events.pending()[0].name(), "ejected_mass_created");
    }

    #[test]
    fn test_eject_cooldown_and_min_mass() {
        let mut world = World::new(Bounds::default(), 5);
        let id = world.spawn_player_at("p", false, Vec2::new(1000.0, 1000.0), 500.0);
        let small = world.spawn_player_at("s", false, Vec2::new(3000.0, 3000.0), eject::MIN_MASS);
        let mut events = EventBus::new();

        eject(&mut world, id, &mut events).unwrap();
        assert!(matches!(
            eject(&mut world, id, &mut events),
            Err(CommandRejected::EjectCooldown { .. })
        ));
        assert_eq!(eject(&mut world, small, &mut events), Ok(0));
        assert_eq!(
            eject(&mut world, 999, &mut events),
            Err(CommandRejected::PlayerMissing(999))
        );
    }

    #[test]
    fn test_merge_conserves_mass_and_uses_centroid() {
        let mut player = player_with(&[300.0, 100.0]);
        player.cells[0].position = Vec2::new(0.0, 0.0);
        player.cells[1].position = Vec2::new(4.0, 0.0);
        let before = player.total_mass();
        let mut events = EventBus::new();

        assert_eq!(merge_cells(&mut player, &mut events), 1);

        assert_eq!(player.cells.len(), 1);
        let cell = &player.cells[0];
        assert!((cell.mass() - before).abs() < EPS);
        assert!((cell.radius() - (before / PI).sqrt()).abs() < 1e-4);
        assert!((cell.position.x - 1.0).abs() < 1e-4);
        assert_eq!(events.pending()[0].name(), "cell_merge");
    }

    #[test]
    fn test_merge_requires_substantial_overlap() {
        // Both radius ~10; threshold = 20 - 5 = 15
        let m = PI * 100.0;
        let mut player = player_with(&[m, m]);
        player.cells[0].position = Vec2::ZERO;
        player.cells[1].position = Vec2::new(16.0, 0.0);
        let mut events = EventBus::new();
        assert_eq!(merge_cells(&mut player, &mut events), 0);

        player.cells[1].position = Vec2::new(14.0, 0.0);
        assert_eq!(merge_cells(&mut player, &mut events), 1);
    }

    #[test]
    fn test_merge_chain_restarts_scan() {
        // Four stacked cells collapse into one; total preserved
        let mut player = player_with(&[200.0, 200.0, 200.0, 200.0]);
        for cell in player.cells.iter_mut() {
            cell.position = Vec2::new(500.0, 500.0);
        }
        let mut events = EventBus::new();

        assert_eq!(merge_cells(&mut player, &mut events), 3);
        assert_eq!(player.cells.len(), 1);
        assert!((player.total_mass() - 800.0).abs() < EPS);
    }

    #[test]
    fn test_merge_blocked_during_cooldown() {
        let mut player = player_with(&[200.0, 200.0]);
        player.cells[1].position = player.cells[0].position;
        player.cells[0].start_merge_cooldown();
        let mut events = EventBus::new();

        assert_eq!(merge_cells(&mut player, &mut events), 0);

        update_merge_timers(&mut player, merge::COOLDOWN + 1.0);
        assert!(player.cells[0].can_merge);
        assert_eq!(player.cells[0].merge_timer, 0.0);
        assert_eq!(merge_cells(&mut player, &mut events), 1);
    }

    #[test]
    fn test_mass_boost_reversed_on_expiry() {
        let mut player = player_with(&[400.0]);
        player.effects.grant(PowerUpType::MassBoost, 1.0);
        player.cells[0].set_mass(400.0 * power_up::MASS_BOOST_FACTOR);

        update_effects(&mut player, 0.5);
        assert!((player.total_mass() - 600.0).abs() < EPS);

        update_effects(&mut player, 0.6);
        assert!((player.total_mass() - 400.0).abs() < EPS);
        assert!(!player.has_effect(PowerUpType::MassBoost));
    }

    #[test]
    fn test_separate_own_cells_pushes_cooldown_cells_apart() {
        let mut player = player_with(&[400.0, 400.0]);
        player.cells[0].position = Vec2::new(100.0, 100.0);
        player.cells[1].position = Vec2::new(110.0, 100.0);
        player.cells[0].start_merge_cooldown();

        separate_own_cells(&mut player);

        let dist = player.cells[0].position.distance_to(player.cells[1].position);
        let min = player.cells[0].radius() + player.cells[1].radius();
        assert!(dist >= min - EPS);
    }
}
