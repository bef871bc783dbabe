/// Tick timing and integration constants
pub mod physics {
    /// Nominal simulation rate in Hz
    pub const TICK_RATE: u32 = 60;
    /// Substituted delta time when the supplied one is NaN, infinite or non-positive
    pub const DEFAULT_DT: f32 = 1.0 / 60.0;
    /// Upper bound on a single tick's delta time (frame hitch protection)
    pub const MAX_TICK_DT: f32 = 0.1;
    /// Upper bound accepted by the integrator itself
    pub const MAX_INTEGRATION_DT: f32 = 1.0;
    /// Velocity multiplier applied once per integration step
    pub const DAMPING: f32 = 0.92;
    /// Speeds below this are snapped to zero when a cell is not being driven
    pub const REST_SPEED: f32 = 0.5;
    /// Mass at which `mass_effect` equals 1.0
    pub const REFERENCE_MASS: f32 = 500.0;
    /// Bounds for the diminishing-returns mass effect
    pub const MIN_MASS_EFFECT: f32 = 0.5;
    pub const MAX_MASS_EFFECT: f32 = 8.0;
    /// Force applied per unit of steering drive
    pub const STEERING_FORCE: f32 = 2400.0;
    /// Steering stops within this distance of the aim point
    pub const STEERING_DEADZONE: f32 = 5.0;
    /// Friction applied to moving food and drifting viruses per tick
    pub const FREE_BODY_FRICTION: f32 = 0.9;
    /// Free bodies slower than this stop
    pub const FREE_BODY_REST_SPEED: f32 = 1.0;
}

/// Speed band constants (smaller cells move faster)
pub mod speed {
    /// Base maximum speed in units/second
    pub const BASE_MAX: f32 = 300.0;
    /// Base minimum speed of an actively driven cell
    pub const BASE_MIN: f32 = 20.0;
    /// Multiplier at or below `LOW_MASS`
    pub const MAX_MULTIPLIER: f32 = 2.2;
    /// Multiplier at or above `HIGH_MASS`
    pub const MIN_MULTIPLIER: f32 = 0.45;
    pub const LOW_MASS: f32 = 100.0;
    pub const HIGH_MASS: f32 = 20_000.0;
}

/// Mass-related constants
pub mod mass {
    /// Mass of a freshly spawned player's cell
    pub const STARTING: f32 = 500.0;
    /// Smallest mass a cell may be reduced to by ejecting
    pub const MINIMUM: f32 = 50.0;
}

/// Split constants
pub mod split {
    /// A cell needs twice this mass to split
    pub const MIN_MASS: f32 = 100.0;
    /// Seconds between accepted split commands
    pub const COOLDOWN: f32 = 0.25;
    /// Launch speed per unit of child radius
    pub const BOOST_PER_RADIUS: f32 = 25.0;
    /// Maximum cells a player may own
    pub const MAX_CELLS: usize = 16;
}

/// Merge constants
pub mod merge {
    /// Seconds a split cell waits before it may merge again
    pub const COOLDOWN: f32 = 10.0;
    /// Fraction of the smaller radius the pair must overlap by
    pub const OVERLAP_FACTOR: f32 = 0.5;
}

/// Mass ejection constants
pub mod eject {
    /// Seconds between accepted eject commands
    pub const COOLDOWN: f32 = 0.1;
    /// Cells at or below this mass do not eject
    pub const MIN_MASS: f32 = 150.0;
    /// Mass removed from the cell (and carried by the ejected food)
    pub const MASS: f32 = 15.0;
    /// Radius of the ejected food pellet
    pub const RADIUS: f32 = 7.0;
    /// Launch speed of ejected mass
    pub const SPEED: f32 = 550.0;
    /// Recoil force applied to the ejecting cell
    pub const RECOIL_FORCE: f32 = 6000.0;
    /// Seconds before the ejecting player may re-absorb its own mass
    pub const SELF_PICKUP_DELAY: f32 = 0.6;
}

/// Food constants
pub mod food {
    pub const RADIUS: f32 = 5.0;
    pub const MIN_VALUE: f32 = 8.0;
    pub const MAX_VALUE: f32 = 14.0;
}

/// Virus constants
pub mod virus {
    /// Radius of a fresh (or reset) virus
    pub const BASE_RADIUS: f32 = 30.0;
    /// Mass added per absorbed ejected-mass pellet
    pub const GROWTH_MASS: f32 = 1800.0;
    /// Radius units per growth stage
    pub const STAGE_RADIUS: f32 = 20.0;
    /// Stage at which a virus resets and spawns a sibling
    pub const MAX_GROWTH_STAGE: u32 = 5;
    /// Hard radius cap; crossing it also triggers a reset
    pub const MAX_RADIUS: f32 = 110.0;
    /// Eater radius must be at least this multiple of the virus radius to shatter
    pub const SPLIT_THRESHOLD_RATIO: f32 = 1.15;
    /// Launch speed range for sibling viruses
    pub const SIBLING_SPEED_MIN: f32 = 150.0;
    pub const SIBLING_SPEED_MAX: f32 = 300.0;
    /// Mass per shattered piece before the piece count is capped
    pub const SHATTER_MASS_UNIT: f32 = 15.0;
    /// Launch speed for shattered pieces
    pub const SHATTER_LAUNCH_SPEED: f32 = 420.0;
}

/// Collision resolution constants
pub mod collision {
    /// Mass ratio required to eat instead of bounce
    pub const EAT_RATIO: f32 = 1.05;
    /// Transfer efficiency at exactly `EAT_RATIO`
    pub const BASE_EFFICIENCY: f32 = 0.8;
    /// Efficiency gained per unit of ratio above `EAT_RATIO`
    pub const EFFICIENCY_SLOPE: f32 = 0.25;
    /// Efficiency cap
    pub const MAX_EFFICIENCY: f32 = 0.95;
    /// Coefficient of restitution for cell bounces
    pub const RESTITUTION: f32 = 0.5;
    /// Slack left after positional correction
    pub const CONTACT_SLOP: f32 = 0.01;
    /// Upper bound on positional-correction sweeps over bounced pairs
    pub const RELAXATION_ITERATIONS: usize = 8;
}

/// Power-up constants
pub mod power_up {
    pub const RADIUS: f32 = 14.0;
    pub const SPEED_DURATION: f32 = 10.0;
    pub const SHIELD_DURATION: f32 = 8.0;
    pub const MASS_BOOST_DURATION: f32 = 12.0;
    pub const INVISIBILITY_DURATION: f32 = 10.0;
    /// Max-speed multiplier while Speed is active
    pub const SPEED_MULTIPLIER: f32 = 1.4;
    /// Mass multiplier while MassBoost is active (divided back out on expiry)
    pub const MASS_BOOST_FACTOR: f32 = 1.5;
}

/// World and spawn policy constants
pub mod world {
    pub const DEFAULT_WIDTH: f32 = 5000.0;
    pub const DEFAULT_HEIGHT: f32 = 5000.0;
    pub const DEFAULT_FOOD_COUNT: usize = 800;
    pub const DEFAULT_VIRUS_COUNT: usize = 20;
    pub const DEFAULT_POWER_UP_COUNT: usize = 6;
    /// Food respawned per second while below target
    pub const FOOD_SPAWN_RATE: f32 = 120.0;
    /// Power-ups respawned per second while below target
    pub const POWER_UP_SPAWN_RATE: f32 = 0.2;
    /// Seconds before a consumed virus is replaced
    pub const VIRUS_RESPAWN_DELAY: f32 = 5.0;
    /// Margin kept from the world edge when spawning
    pub const SPAWN_MARGIN: f32 = 100.0;
    /// Number of leaderboard entries
    pub const LEADERBOARD_SIZE: usize = 10;
}

/// AI decision engine constants
pub mod ai {
    pub const COUNT: usize = 12;
    pub const MIN_DIFFICULTY: u8 = 1;
    pub const MAX_DIFFICULTY: u8 = 5;
    /// Decision interval: BASE - PER_DIFFICULTY * difficulty, floored at MIN
    pub const DECISION_INTERVAL_BASE: f32 = 2.0;
    pub const DECISION_INTERVAL_PER_DIFFICULTY: f32 = 0.15;
    pub const DECISION_INTERVAL_MIN: f32 = 0.5;
    /// Stuck detection
    pub const STUCK_DISTANCE: f32 = 5.0;
    pub const STUCK_TIME: f32 = 5.0;
    /// Behaviors last a random duration in this range before they may expire
    pub const BEHAVIOR_DURATION_MIN: f32 = 5.0;
    pub const BEHAVIOR_DURATION_MAX: f32 = 10.0;
    /// Per-tick chance an expired behavior is re-evaluated
    pub const BEHAVIOR_EXPIRY_CHANCE: f64 = 0.05;
    /// Detection radius: BASE + mass / MASS_DIVISOR + difficulty * PER_DIFFICULTY
    pub const DETECTION_BASE: f32 = 600.0;
    pub const DETECTION_MASS_DIVISOR: f32 = 10.0;
    pub const DETECTION_PER_DIFFICULTY: f32 = 150.0;
    /// Classification thresholds
    pub const THREAT_RATIO: f32 = 1.1;
    pub const PREY_RATIO: f32 = 0.9;
    pub const TEAMMATE_TOLERANCE: f32 = 0.3;
    /// Seconds a sighting stays in short-term memory
    pub const MEMORY_DURATION: f32 = 8.0;
    /// Prey closer than this (plus own radius) can be split-attacked
    pub const SPLIT_ATTACK_RANGE: f32 = 250.0;
    /// Distance a baiting bot keeps from its mark
    pub const BAIT_DISTANCE: f32 = 260.0;
    /// Distance a teamed-up bot keeps from its ally
    pub const TEAM_DISTANCE: f32 = 180.0;
    /// Wander look-ahead and turn rate (radians/second)
    pub const WANDER_LOOKAHEAD: f32 = 250.0;
    pub const WANDER_TURN_RATE: f32 = 1.2;
    /// Distance from the wall where bots start steering back inward
    pub const WALL_AVOID_MARGIN: f32 = 200.0;
    /// Per-tick chances for optional sub-actions
    pub const BAIT_EJECT_CHANCE: f64 = 0.08;
    pub const FEED_ALLY_CHANCE: f64 = 0.02;
    /// An ambusher strikes once its mark is this close (plus own radius)
    pub const AMBUSH_STRIKE_DISTANCE: f32 = 180.0;
    /// Waypoints and food targets count as reached within this distance (plus own radius)
    pub const ARRIVAL_DISTANCE: f32 = 20.0;
    /// Nearest food items considered per decision
    pub const FOOD_PERCEPTION_LIMIT: usize = 32;

    /// Steering drive per behavior (fraction of full steering force)
    pub mod drive {
        pub const WANDER: f32 = 0.5;
        pub const CHASE: f32 = 1.0;
        pub const FLEE: f32 = 1.0;
        pub const FEED: f32 = 0.8;
        pub const SPLIT_ATTACK: f32 = 1.0;
        pub const AMBUSH_LURK: f32 = 0.3;
        pub const DEFEND: f32 = 0.7;
        pub const SCAVENGE: f32 = 0.8;
        pub const PATROL: f32 = 0.6;
        pub const HUNT: f32 = 0.9;
        pub const BAIT: f32 = 0.6;
        pub const TEAM_UP: f32 = 0.6;
    }
}

/// Mass↔radius law: `mass = π·r²`
#[inline]
pub fn mass_to_radius(mass: f32) -> f32 {
    (mass.max(0.0) / std::f32::consts::PI).sqrt()
}

/// Inverse of [`mass_to_radius`]
#[inline]
pub fn radius_to_mass(radius: f32) -> f32 {
    std::f32::consts::PI * radius * radius
}

/// Diminishing-returns divisor applied to force: large cells accelerate slower
/// but are never immune to force
#[inline]
pub fn mass_effect(mass: f32) -> f32 {
    let ratio = mass.max(f32::EPSILON) / physics::REFERENCE_MASS;
    ratio
        .sqrt()
        .clamp(physics::MIN_MASS_EFFECT, physics::MAX_MASS_EFFECT)
}

/// Speed multiplier linearly interpolated between `MAX_MULTIPLIER` at low mass
/// and `MIN_MULTIPLIER` at high mass
#[inline]
pub fn speed_multiplier(mass: f32) -> f32 {
    let t = ((mass - speed::LOW_MASS) / (speed::HIGH_MASS - speed::LOW_MASS)).clamp(0.0, 1.0);
    if t.is_nan() {
        return speed::MIN_MULTIPLIER;
    }
    speed::MAX_MULTIPLIER + (speed::MIN_MULTIPLIER - speed::MAX_MULTIPLIER) * t
}
