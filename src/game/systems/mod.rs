pub mod physics;
pub mod lifecycle;
pub mod virus;
pub mod collision;
pub mod ai;
pub mod spawn;
