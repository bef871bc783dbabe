//! Cell Arena Simulation Library
//!
//! A deterministic, single-threaded simulation of an arena of mass-conserving
//! circular cells that move, split, merge, eat and get eaten, alongside food,
//! viruses and power-ups, with AI-driven players.
//!
//! Renderers and input layers sit outside this crate: they read entity state
//! through [`game::state::World`] and subscribe to [`game::events::GameEvent`]s.

pub mod config;
pub mod util;
pub mod game;
