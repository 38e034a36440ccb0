//! Test fixtures and data generators
//!
//! Provides the games list, cache files and process tables used by the
//! integration tests.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use rpc_core::{DetectableGame, Platform, Snowflake};
use rpc_detect::database::CACHE_FILE;
use rpc_detect::{DetectionError, ProcessSnapshot, ProcessSource};
use serde_json::{json, Value};

pub const TEST_TOKEN: &str = "integration-test-token";

/// Id of the game whose executable is `game.exe`
pub const GAME_ID: u64 = 123;

/// Command line of a running `game.exe`
pub const GAME_COMMAND: &str = "/home/player/games/game.exe";

/// The detectable games list in wire format
pub fn detectable_games() -> Value {
    json!([
        {
            "id": GAME_ID.to_string(),
            "name": "Test Game",
            "executables": [{ "os": "linux", "name": "game.exe" }]
        },
        {
            "id": "456",
            "name": "Other Game",
            "executables": [{ "os": "win32", "name": "other/other.exe" }]
        }
    ])
}

/// Write a games cache that was last refreshed `age` ago
pub fn write_cache(data_dir: &Path, age: chrono::Duration) -> Result<()> {
    let games = vec![DetectableGame::new(Snowflake::new(GAME_ID), "Test Game")
        .with_executable(Platform::Linux, "game.exe")];
    let snapshot = json!({
        "fetched_at": Utc::now() - age,
        "etag": null,
        "games": games,
    });
    std::fs::write(data_dir.join(CACHE_FILE), serde_json::to_vec(&snapshot)?)?;
    Ok(())
}

/// Process list the tests can change while the daemon runs
#[derive(Clone, Default)]
pub struct ProcessTable(Arc<Mutex<Vec<ProcessSnapshot>>>);

impl ProcessTable {
    pub fn running(commands: &[&str]) -> Self {
        let table = Self::default();
        table.set(commands);
        table
    }

    /// Replace the running processes; pids follow the order given
    pub fn set(&self, commands: &[&str]) {
        *self.0.lock() = commands
            .iter()
            .enumerate()
            .filter_map(|(i, command)| ProcessSnapshot::from_command(1_000 + i as u32, command))
            .collect();
    }

    pub fn source(&self) -> impl ProcessSource + 'static {
        let table = Arc::clone(&self.0);
        move || -> Result<Vec<ProcessSnapshot>, DetectionError> { Ok(table.lock().clone()) }
    }
}
