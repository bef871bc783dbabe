use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use cell_arena::config::SimConfig;
use cell_arena::game::constants::world::LEADERBOARD_SIZE;
use cell_arena::game::events::GameEvent;
use cell_arena::game::game_loop::Simulation;
use cell_arena::game::performance::PerformanceMonitor;

/// Seconds between leaderboard/performance log lines
const REPORT_INTERVAL_SECS: u64 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Cell Arena v{}", env!("CARGO_PKG_VERSION"));

    let config = SimConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {}x{} world, {} bots at difficulty {}, {} Hz, seed {}",
        config.world_width,
        config.world_height,
        config.bot_count,
        config.bot_difficulty,
        config.tick_rate,
        config.seed
    );

    let mut sim = Simulation::new(config.clone());
    sim.fill_with_bots(config.bot_count);

    sim.events_mut().subscribe_all(|event| match event {
        GameEvent::PlayerEliminated(e) => {
            info!(player = e.player, eliminator = ?e.eliminator, "eliminated");
        }
        GameEvent::VirusSplit(e) => {
            debug!(x = e.position.x, y = e.position.y, "virus split");
        }
        other => {
            debug!(event = other.name(), "game event");
        }
    });

    let dt = config.tick_dt();
    let mut ticker = interval(Duration::from_secs_f32(dt));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ticks_per_report = REPORT_INTERVAL_SECS * config.tick_rate as u64;
    let mut performance = PerformanceMonitor::new(config.tick_rate);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
            _ = ticker.tick() => {
                performance.begin_tick();
                let report = sim.tick(dt);
                if performance.status().can_respawn_bots() {
                    sim.respawn_bots();
                }
                performance.end_tick(sim.world().entity_count());

                if report.entities_dropped > 0 {
                    warn!(tick = report.tick, dropped = report.entities_dropped, "malformed entities dropped");
                }

                if report.tick % ticks_per_report == 0 {
                    for (rank, entry) in sim.world().leaderboard(LEADERBOARD_SIZE).iter().enumerate() {
                        info!("#{:<2} {:<12} mass {:>8.0} score {:>8.0}", rank + 1, entry.name, entry.mass, entry.score);
                    }
                    let perf = performance.report();
                    info!(
                        status = ?perf.status,
                        avg_ms = perf.average_ms,
                        p95_ms = perf.p95_ms,
                        budget_pct = perf.budget_percent,
                        entities = perf.entity_count,
                        "tick performance"
                    );
                }

                if config.max_ticks.is_some_and(|max| report.tick >= max) {
                    info!(ticks = report.tick, "Reached MAX_TICKS");
                    break;
                }
            }
        }
    }

    let final_board = sim.world().leaderboard(LEADERBOARD_SIZE);
    info!("Final standings: {}", serde_json::to_string(&final_board)?);

    Ok(())
}
