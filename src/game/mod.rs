pub mod constants;
pub mod state;
pub mod events;
pub mod spatial;
pub mod systems;
pub mod game_loop;
pub mod performance;
