//! Domain entities

mod activity;
mod game;

pub use activity::{Activity, ActivityAssets, ActivityType};
pub use game::{DetectableGame, Executable, Platform};
