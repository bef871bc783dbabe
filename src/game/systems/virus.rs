use rand::Rng;

use crate::game::constants::virus::{
    BASE_RADIUS, GROWTH_MASS, MAX_RADIUS, SIBLING_SPEED_MAX, SIBLING_SPEED_MIN, SPLIT_THRESHOLD_RATIO,
    STAGE_RADIUS,
};
use crate::game::constants::{mass_to_radius, radius_to_mass};
use crate::game::state::{Cell, Virus};
use crate::util::vec2::Vec2;

/// Result of feeding a virus one pellet of ejected mass
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GrowthOutcome {
    /// Virus grew and stays in play at `stage`
    Grew { stage: u32 },
    /// Virus hit its cap and reset; a sibling should spawn here
    Split { position: Vec2, velocity: Vec2 },
}

/// Growth stage for a radius, clamped to `[1, max_stage]`
#[inline]
pub fn stage_for_radius(radius: f32, max_stage: u32) -> u32 {
    let stage = (radius / STAGE_RADIUS).floor();
    if stage.is_finite() {
        (stage.max(1.0) as u32).min(max_stage)
    } else {
        1
    }
}

impl Virus {
    /// Return to base size and stage 1
    pub fn reset(&mut self) {
        self.set_radius(BASE_RADIUS);
    }

    fn set_mass(&mut self, mass: f32) {
        self.mass = mass;
        self.radius = mass_to_radius(mass);
        self.refresh_derived();
    }

    fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
        self.mass = radius_to_mass(radius);
        self.refresh_derived();
    }

    fn refresh_derived(&mut self) {
        self.growth_stage = stage_for_radius(self.radius, self.max_growth_stage);
        self.split_threshold = self.radius * SPLIT_THRESHOLD_RATIO;
    }

    /// Absorb one pellet of ejected mass
    ///
    /// Crossing the radius cap or reaching the max stage resets the virus
    /// and yields the spawn position/velocity for its sibling.
    pub fn grow(&mut self, rng: &mut impl Rng) -> GrowthOutcome {
        self.set_mass(self.mass + GROWTH_MASS);

        let raw_stage = (self.radius / STAGE_RADIUS).floor();
        if self.radius > MAX_RADIUS || raw_stage >= self.max_growth_stage as f32 {
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let dir = Vec2::from_angle(angle);
            let speed = rng.gen_range(SIBLING_SPEED_MIN..=SIBLING_SPEED_MAX);
            let position = self.position + dir * (BASE_RADIUS * 2.0);

            self.reset();
            tracing::debug!(virus = self.id, x = position.x, y = position.y, "virus split");
            return GrowthOutcome::Split {
                position,
                velocity: dir * speed,
            };
        }

        GrowthOutcome::Grew {
            stage: self.growth_stage,
        }
    }

    /// Whether `cell` is big enough to shatter on this virus
    #[inline]
    pub fn can_split(&self, cell: &Cell) -> bool {
        cell.radius() >= self.split_threshold
    }

    /// Test/debug hook: force a specific radius
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.set_radius(radius);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::virus::MAX_GROWTH_STAGE;
    use crate::game::state::Color;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_new_virus_is_base_stage() {
        let v = Virus::new(1, Vec2::new(100.0, 100.0));
        assert_eq!(v.radius(), BASE_RADIUS);
        assert_eq!(v.growth_stage, 1);
        assert!((v.mass() - radius_to_mass(BASE_RADIUS)).abs() < 0.01);
        assert!((v.split_threshold - BASE_RADIUS * SPLIT_THRESHOLD_RATIO).abs() < 1e-4);
    }

    #[test]
    fn test_grow_adds_mass_and_restages() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut v = Virus::new(1, Vec2::ZERO);
        let before = v.mass();

        let outcome = v.grow(&mut rng);

        assert!((v.mass() - (before + GROWTH_MASS)).abs() < 0.1);
        assert!((v.radius() - mass_to_radius(v.mass())).abs() < 1e-4);
        assert_eq!(outcome, GrowthOutcome::Grew { stage: stage_for_radius(v.radius(), MAX_GROWTH_STAGE) });
    }

    #[test]
    fn test_stage_four_crosses_cap_and_resets() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut v = Virus::new(1, Vec2::new(500.0, 500.0)).with_radius(99.5);
        assert_eq!(v.growth_stage, 4);

        let outcome = v.grow(&mut rng);

        match outcome {
            GrowthOutcome::Split { position, velocity } => {
                assert!(position.distance_to(Vec2::new(500.0, 500.0)) > 0.0);
                let speed = velocity.length();
                assert!((SIBLING_SPEED_MIN - 0.01..=SIBLING_SPEED_MAX + 0.01).contains(&speed));
            }
            other => panic!("expected split, got {:?}", other),
        }
        assert_eq!(v.growth_stage, 1);
        assert_eq!(v.radius(), BASE_RADIUS);
        assert!((v.mass() - radius_to_mass(BASE_RADIUS)).abs() < 0.01);
    }

    #[test]
    fn test_repeated_growth_eventually_splits() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut v = Virus::new(1, Vec2::ZERO);
        let mut splits = 0;
        for _ in 0..100 {
            if let GrowthOutcome::Split { .. } = v.grow(&mut rng) {
                splits += 1;
            }
            assert!(v.growth_stage >= 1 && v.growth_stage <= MAX_GROWTH_STAGE);
            assert!(v.radius() <= MAX_RADIUS);
        }
        assert!(splits > 0);
    }

    #[test]
    fn test_can_split_predicate() {
        let v = Virus::new(1, Vec2::ZERO);
        let small = Cell::new(1, Vec2::ZERO, radius_to_mass(30.0), Color::VIRUS);
        let big = Cell::new(1, Vec2::ZERO, radius_to_mass(40.0), Color::VIRUS);
        assert!(!v.can_split(&small));
        assert!(v.can_split(&big));
    }

    #[test]
    fn test_stage_for_radius_clamps() {
        assert_eq!(stage_for_radius(5.0, 5), 1);
        assert_eq!(stage_for_radius(65.0, 5), 3);
        assert_eq!(stage_for_radius(500.0, 5), 5);
        assert_eq!(stage_for_radius(f32::NAN, 5), 1);
    }
}
