//! Detection events

mod game_event;

pub use game_event::GameEvent;
