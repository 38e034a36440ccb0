//! In-memory executable index

use std::collections::HashMap;
use std::sync::Arc;

use rpc_core::{DetectableGame, Executable, Platform};

/// Immutable lookup table from executable signature to game
///
/// Built once per catalog version and swapped as a whole.
#[derive(Debug, Default)]
pub struct GameIndex {
    games: Vec<Arc<DetectableGame>>,
    by_executable: HashMap<(Platform, String), Arc<DetectableGame>>,
}

impl GameIndex {
    /// Index `games`; the first game listing a signature owns it
    #[must_use]
    pub fn new(games: Vec<DetectableGame>) -> Self {
        let games: Vec<Arc<DetectableGame>> = games.into_iter().map(Arc::new).collect();
        let mut by_executable = HashMap::new();

        for game in &games {
            for exe in &game.executables {
                by_executable
                    .entry((exe.platform, exe.name.clone()))
                    .or_insert_with(|| Arc::clone(game));
            }
        }

        Self { games, by_executable }
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn games(&self) -> &[Arc<DetectableGame>] {
        &self.games
    }

    /// Exact, case-insensitive match of an executable name or path fragment
    ///
    /// Signatures of every platform that runs on `platform` are checked,
    /// native ones first.
    pub fn lookup(&self, executable: &str, platform: Platform) -> Option<Arc<DetectableGame>> {
        let name = Executable::normalize(executable);
        if name.is_empty() {
            return None;
        }
        self.lookup_normalized(&name, platform)
    }

    fn lookup_normalized(&self, name: &str, platform: Platform) -> Option<Arc<DetectableGame>> {
        std::iter::once(platform)
            .chain([Platform::Linux, Platform::Windows, Platform::MacOs])
            .filter(|candidate| platform.runs(*candidate))
            .find_map(|candidate| self.by_executable.get(&(candidate, name.to_string())))
            .cloned()
    }

    /// Match a full executable path
    ///
    /// Tries the file name, then ever longer trailing runs of path
    /// components, so `.../Hades/x64/Hades.exe` matches `x64/hades.exe`.
    pub fn lookup_path(&self, path: &str, platform: Platform) -> Option<Arc<DetectableGame>> {
        let normalized = Executable::normalize(path);
        let components: Vec<&str> = normalized.split('/').filter(|c| !c.is_empty()).collect();

        (1..=components.len()).find_map(|take| {
            let suffix = components[components.len() - take..].join("/");
            self.lookup_normalized(&suffix, platform)
        })
    }
}
