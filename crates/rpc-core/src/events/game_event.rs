//! Game detection events
//!
//! Emitted by the detector and consumed by the presence coordinator.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::entities::DetectableGame;
use crate::value_objects::Snowflake;

/// A change in the set of running detectable games
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// A detectable game appeared
    Started {
        game: Arc<DetectableGame>,
        /// Path of the process that matched
        executable: String,
        at: DateTime<Utc>,
    },
    /// A previously started game is no longer running
    Stopped { id: Snowflake, at: DateTime<Utc> },
}

impl GameEvent {
    /// Create a `Started` event stamped now
    #[must_use]
    pub fn started(game: Arc<DetectableGame>, executable: impl Into<String>) -> Self {
        Self::Started {
            game,
            executable: executable.into(),
            at: Utc::now(),
        }
    }

    /// Create a `Stopped` event stamped now
    #[must_use]
    pub fn stopped(id: Snowflake) -> Self {
        Self::Stopped { id, at: Utc::now() }
    }

    /// Application id the event refers to
    #[must_use]
    pub fn app_id(&self) -> Snowflake {
        match self {
            Self::Started { game, .. } => game.id,
            Self::Stopped { id, .. } => *id,
        }
    }

    /// Event time
    #[must_use]
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::Started { at, .. } | Self::Stopped { at, .. } => *at,
        }
    }

    /// Get the event name for logging
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "GAME_STARTED",
            Self::Stopped { .. } => "GAME_STOPPED",
        }
    }
}
