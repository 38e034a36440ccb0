//! # rpc-core
//!
//! Domain layer containing the presence activity model, detectable games, and
//! the events the game detector emits.
//! This crate has zero dependencies on infrastructure (network, process tables, etc.).

pub mod entities;
pub mod events;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{Activity, ActivityAssets, ActivityType, DetectableGame, Executable, Platform};
pub use events::GameEvent;
pub use value_objects::{Snowflake, SnowflakeParseError};
