//! Simulation events
//!
//! Systems queue events while the tick runs; the event bus hands them to
//! subscribers once the tick has finished, so observers only ever see
//! completed state.

use serde::Serialize;

use crate::game::state::{Color, EntityId, PlayerId, PowerUpType};
use crate::util::vec2::Vec2;

/// Two of a player's cells fused
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellMerge {
    pub player: PlayerId,
    /// Position of the surviving cell after the merge
    pub position: Vec2,
    /// Position of the absorbed cell before the merge
    pub absorbed_position: Vec2,
    pub color: Color,
}

/// A virus hit its growth cap; a sibling should appear
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirusSplit {
    pub position: Vec2,
    pub velocity: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirusGrew {
    pub virus: EntityId,
    pub position: Vec2,
    pub stage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerEliminated {
    pub player: PlayerId,
    pub position: Vec2,
    pub color: Color,
    /// Player whose cell ate the last remaining cell
    pub eliminator: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerUpCollected {
    pub player: PlayerId,
    pub position: Vec2,
    pub color: Color,
    pub kind: PowerUpType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EjectedMassCreated {
    pub player: PlayerId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub radius: f32,
    pub color: Color,
}

/// Every event the simulation emits
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    CellMerge(CellMerge),
    VirusSplit(VirusSplit),
    VirusGrew(VirusGrew),
    PlayerEliminated(PlayerEliminated),
    PowerUpCollected(PowerUpCollected),
    EjectedMassCreated(EjectedMassCreated),
}

impl GameEvent {
    /// Subscription name (matches the serialized `event` tag)
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::CellMerge(_) => "cell_merge",
            GameEvent::VirusSplit(_) => "virus_split",
            GameEvent::VirusGrew(_) => "virus_grew",
            GameEvent::PlayerEliminated(_) => "player_eliminated",
            GameEvent::PowerUpCollected(_) => "power_up_collected",
            GameEvent::EjectedMassCreated(_) => "ejected_mass_created",
        }
    }
}

pub type EventHandler = Box<dyn FnMut(&GameEvent) + Send>;

struct Subscription {
    /// `None` receives every event
    name: Option<&'static str>,
    handler: EventHandler,
}

/// Queue plus name-keyed subscriber list
#[derive(Default)]
pub struct EventBus {
    queue: Vec<GameEvent>,
    subscriptions: Vec<Subscription>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("queued", &self.queue.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one event by name (e.g. `"virus_split"`)
    pub fn subscribe<F>(&mut self, name: &'static str, handler: F)
    where
        F: FnMut(&GameEvent) + Send + 'static,
    {
        self.subscriptions.push(Subscription {
            name: Some(name),
            handler: Box::new(handler),
        });
    }

    /// Subscribe to every event
    pub fn subscribe_all<F>(&mut self, handler: F)
    where
        F: FnMut(&GameEvent) + Send + 'static,
    {
        self.subscriptions.push(Subscription {
            name: None,
            handler: Box::new(handler),
        });
    }

    pub fn emit(&mut self, event: GameEvent) {
        self.queue.push(event);
    }

    pub fn pending(&self) -> &[GameEvent] {
        &self.queue
    }

    /// Deliver queued events to subscribers in emission order and return them
    pub fn dispatch(&mut self) -> Vec<GameEvent> {
        let events = std::mem::take(&mut self.queue);
        for event in &events {
            let name = event.name();
            for sub in self.subscriptions.iter_mut() {
                if sub.name.map_or(true, |n| n == name) {
                    (sub.handler)(event);
                }
            }
        }
        events
    }

    /// Take queued events without notifying subscribers
    pub fn drain(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn split_event() -> GameEvent {
        GameEvent::VirusSplit(VirusSplit {
            position: Vec2::new(1.0, 2.0),
            velocity: Vec2::new(3.0, 4.0),
        })
    }

    fn grew_event() -> GameEvent {
        GameEvent::VirusGrew(VirusGrew {
            virus: 9,
            position: Vec2::ZERO,
            stage: 2,
        })
    }

    #[test]
    fn test_name_matches_serialized_tag() {
        let json = serde_json::to_value(split_event()).unwrap();
        assert_eq!(json["event"], "virus_split");
        assert_eq!(json["velocity"]["x"], 3.0);

        let json = serde_json::to_value(grew_event()).unwrap();
        assert_eq!(json["event"], grew_event().name());
    }

    #[test]
    fn test_subscribe_by_name() {
        let mut bus = EventBus::new();
        let splits = Arc::new(AtomicUsize::new(0));
        let all = Arc::new(AtomicUsize::new(0));

        let s = splits.clone();
        bus.subscribe("virus_split", move |_| {
            s.fetch_add(1, Ordering::Relaxed);
        });
        let a = all.clone();
        bus.subscribe_all(move |_| {
            a.fetch_add(1, Ordering::Relaxed);
        });

        bus.emit(split_event());
        bus.emit(grew_event());
        let delivered = bus.dispatch();

        assert_eq!(delivered.len(), 2);
        assert_eq!(splits.load(Ordering::Relaxed), 1);
        assert_eq!(all.load(Ordering::Relaxed), 2);
        assert!(bus.pending().is_empty());
    }

    #[test]
    fn test_drain_skips_subscribers() {
        let mut bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        bus.subscribe_all(move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        });

        bus.emit(split_event());
        assert_eq!(bus.drain().len(), 1);
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }
}
