//! Game detector
//!
//! Polls the process list, diffs it by pid against the previous tick and
//! turns matches into `GameEvent`s. One game is active at a time: the
//! first one detected stays active until it stops.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rpc_common::SameTickPolicy;
use rpc_core::{DetectableGame, GameEvent, Platform, Snowflake};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::database::{CatalogSource, GameCatalog, GameIndex};
use crate::error::DetectionError;
use crate::process::ProcessSource;

/// Default poll interval
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How often a long-running detector checks whether the catalog is due
pub const CATALOG_RECHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Upper bound for one catalog download
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug)]
struct Tracked {
    path: String,
    /// Matched, non-blacklisted game
    game: Option<Arc<DetectableGame>>,
    /// (tick first seen, same-tick tie-break); lower wins
    rank: (u64, u64),
}

struct CatalogRefresh {
    source: Arc<dyn CatalogSource>,
    delay_days: u32,
    last_check: Option<Instant>,
}

/// Detects running games and reports start/stop events
pub struct GameDetector<P> {
    source: P,
    catalog: Arc<GameCatalog>,
    platform: Platform,
    policy: SameTickPolicy,
    blacklist: HashSet<Snowflake>,
    poll_interval: Duration,
    refresh: Option<CatalogRefresh>,
    tracked: HashMap<u32, Tracked>,
    /// Catalog version the tracked matches were made against
    matched_against: Option<Arc<GameIndex>>,
    active: Option<(u32, Arc<DetectableGame>)>,
    ticks: u64,
}

impl<P: ProcessSource> GameDetector<P> {
    #[must_use]
    pub fn new(source: P, catalog: Arc<GameCatalog>, platform: Platform) -> Self {
        Self {
            source,
            catalog,
            platform,
            policy: SameTickPolicy::default(),
            blacklist: HashSet::new(),
            poll_interval: POLL_INTERVAL,
            refresh: None,
            tracked: HashMap::new(),
            matched_against: None,
            active: None,
            ticks: 0,
        }
    }

    /// Tie-break for games first seen on the same tick
    #[must_use]
    pub fn with_policy(mut self, policy: SameTickPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Games that are noted but never become active
    #[must_use]
    pub fn with_blacklist(mut self, blacklist: HashSet<Snowflake>) -> Self {
        self.blacklist = blacklist;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Refresh the catalog from `source` every `delay_days` (0 = on every check)
    #[must_use]
    pub fn with_refresh(mut self, source: Arc<dyn CatalogSource>, delay_days: u32) -> Self {
        self.refresh = Some(CatalogRefresh {
            source,
            delay_days,
            last_check: None,
        });
        self
    }

    /// Game currently reported as running
    pub fn active(&self) -> Option<&Arc<DetectableGame>> {
        self.active.as_ref().map(|(_, game)| game)
    }

    /// Run one poll: enumerate, diff, emit
    pub fn tick(&mut self) -> Result<Vec<GameEvent>, DetectionError> {
        let processes = self.source.snapshot()?;
        self.ticks += 1;

        let alive: HashSet<u32> = processes.iter().map(|p| p.pid).collect();
        self.tracked.retain(|pid, _| alive.contains(pid));

        // A new catalog may know processes the old one did not
        let index = self.catalog.index();
        if let Some(previous) = self.matched_against.replace(Arc::clone(&index)) {
            if !Arc::ptr_eq(&previous, &index) {
                for (pid, tracked) in self.tracked.iter_mut().filter(|(_, t)| t.game.is_none()) {
                    tracked.game = classify(&index, &tracked.path, *pid, self.platform, &self.blacklist);
                }
            }
        }

        for (position, process) in processes.iter().enumerate() {
            if self.tracked.contains_key(&process.pid) {
                continue;
            }

            let game = classify(&index, &process.executable_path, process.pid, self.platform, &self.blacklist);
            let tie_break = match self.policy {
                SameTickPolicy::EnumerationOrder => position as u64,
                SameTickPolicy::LowestPid => u64::from(process.pid),
            };
            self.tracked.insert(
                process.pid,
                Tracked {
                    path: process.executable_path.clone(),
                    game,
                    rank: (self.ticks, tie_break),
                },
            );
        }

        let mut events = Vec::new();

        if let Some((pid, game)) = self.active.take() {
            if self.tracked.contains_key(&pid) {
                self.active = Some((pid, game));
            } else if let Some(other) = self.best_candidate(Some(game.id)) {
                // Another instance of the same game is still running
                self.active = Some((other, game));
            } else {
                tracing::info!(app_id = %game.id, name = %game.name, "Game stopped");
                events.push(GameEvent::stopped(game.id));
            }
        }

        if self.active.is_none() {
            let next = self
                .best_candidate(None)
                .and_then(|pid| self.tracked.get(&pid).and_then(|t| t.game.clone()).map(|game| (pid, game)));
            if let Some((pid, game)) = next {
                tracing::info!(app_id = %game.id, name = %game.name, pid, "Game started");
                let executable = self.tracked.get(&pid).map(|t| t.path.clone()).unwrap_or_default();
                events.push(GameEvent::started(Arc::clone(&game), executable));
                self.active = Some((pid, game));
            }
        }

        Ok(events)
    }

    /// Lowest ranked matched process, optionally of one game only
    fn best_candidate(&self, only: Option<Snowflake>) -> Option<u32> {
        self.tracked
            .iter()
            .filter_map(|(pid, tracked)| {
                let game = tracked.game.as_ref()?;
                only.is_none_or(|id| game.id == id).then_some((tracked.rank, *pid))
            })
            .min()
            .map(|(_, pid)| pid)
    }

    async fn refresh_catalog_if_due(&mut self) {
        let Some(refresh) = &mut self.refresh else {
            return;
        };
        if refresh
            .last_check
            .is_some_and(|checked| checked.elapsed() < CATALOG_RECHECK_INTERVAL)
        {
            return;
        }
        refresh.last_check = Some(Instant::now());

        if !self.catalog.is_refresh_due(refresh.delay_days) {
            return;
        }

        match self
            .catalog
            .refresh_with_timeout(refresh.source.as_ref(), REFRESH_TIMEOUT)
            .await
        {
            Ok(index) => tracing::debug!(games = index.len(), "Catalog refreshed"),
            Err(e) => tracing::warn!(error = %e, games = self.catalog.len(), "Catalog refresh failed, keeping cached list"),
        }
    }

    /// Poll until shutdown or until nobody listens to `events`
    pub async fn run(mut self, events: mpsc::Sender<GameEvent>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            platform = %self.platform,
            poll_secs = self.poll_interval.as_secs_f64(),
            games = self.catalog.len(),
            "Game detection started"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'poll: loop {
            tokio::select! {
                _ = interval.tick() => {}
                () = wait_for_shutdown(&mut shutdown) => break,
            }

            tokio::select! {
                () = self.refresh_catalog_if_due() => {}
                () = wait_for_shutdown(&mut shutdown) => break,
            }

            let batch = match self.tick() {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping detection tick");
                    continue;
                }
            };
            for event in batch {
                tokio::select! {
                    sent = events.send(event) => {
                        if sent.is_err() {
                            tracing::debug!("Event receiver dropped, stopping detection");
                            return;
                        }
                    }
                    () = wait_for_shutdown(&mut shutdown) => break 'poll,
                }
            }
        }

        tracing::info!("Game detection stopped");
    }
}

/// The game `path` runs, unless unknown or blacklisted
fn classify(
    index: &GameIndex,
    path: &str,
    pid: u32,
    platform: Platform,
    blacklist: &HashSet<Snowflake>,
) -> Option<Arc<DetectableGame>> {
    let game = index.lookup_path(path, platform)?;
    if blacklist.contains(&game.id) {
        tracing::debug!(app_id = %game.id, name = %game.name, pid, "Ignoring blacklisted game");
        return None;
    }
    tracing::debug!(app_id = %game.id, name = %game.name, pid, "Game process appeared");
    Some(game)
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also means shutdown
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Fetched;
    use crate::error::RefreshError;
    use crate::process::ProcessSnapshot;
    use std::collections::VecDeque;

    fn catalog() -> Arc<GameCatalog> {
        Arc::new(GameCatalog::with_games(
            std::path::Path::new("/nonexistent"),
            vec![
                DetectableGame::new(Snowflake::new(1), "Alpha").with_executable(Platform::Linux, "alpha"),
                DetectableGame::new(Snowflake::new(2), "Beta").with_executable(Platform::Windows, "beta.exe"),
                DetectableGame::new(Snowflake::new(3), "Gamma").with_executable(Platform::Linux, "gamma"),
            ],
        ))
    }

    fn proc(pid: u32, path: &str) -> ProcessSnapshot {
        ProcessSnapshot::from_command(pid, path).unwrap()
    }

    /// A process source replaying one list per tick
    fn scripted(
        ticks: Vec<Vec<ProcessSnapshot>>,
    ) -> impl FnMut() -> Result<Vec<ProcessSnapshot>, DetectionError> + Send {
        let mut ticks: VecDeque<_> = ticks.into();
        move || ticks.pop_front().ok_or_else(|| DetectionError::Enumeration("script ended".to_string()))
    }

    fn detector(ticks: Vec<Vec<ProcessSnapshot>>) -> GameDetector<impl ProcessSource> {
        GameDetector::new(scripted(ticks), catalog(), Platform::Linux)
    }

    fn ids(events: &[GameEvent]) -> Vec<(&'static str, u64)> {
        events.iter().map(|e| (e.name(), e.app_id().into_inner())).collect()
    }

    #[test]
    fn test_start_and_stop() {
        let mut detector = detector(vec![
            vec![proc(10, "/usr/bin/editor")],
            vec![proc(10, "/usr/bin/editor"), proc(11, "/games/alpha")],
            vec![proc(10, "/usr/bin/editor"), proc(11, "/games/alpha")],
            vec![proc(10, "/usr/bin/editor")],
        ]);

        assert!(detector.tick().unwrap().is_empty());
        assert_eq!(ids(&detector.tick().unwrap()), vec![("GAME_STARTED", 1)]);
        assert!(detector.tick().unwrap().is_empty());
        assert_eq!(ids(&detector.tick().unwrap()), vec![("GAME_STOPPED", 1)]);
        assert!(detector.active().is_none());
    }

    #[test]
    fn test_first_detected_wins() {
        let mut detector = detector(vec![
            vec![proc(20, "/games/alpha")],
            vec![proc(20, "/games/alpha"), proc(5, "Z:\\games\\beta.exe -windowed")],
            vec![proc(5, "Z:\\games\\beta.exe -windowed")],
            vec![],
        ]);

        assert_eq!(ids(&detector.tick().unwrap()), vec![("GAME_STARTED", 1)]);
        // Beta appears while Alpha runs: ignored
        assert!(detector.tick().unwrap().is_empty());
        assert_eq!(detector.active().unwrap().id, Snowflake::new(1));
        // Alpha stops: Beta is promoted
        assert_eq!(
            ids(&detector.tick().unwrap()),
            vec![("GAME_STOPPED", 1), ("GAME_STARTED", 2)]
        );
        assert_eq!(ids(&detector.tick().unwrap()), vec![("GAME_STOPPED", 2)]);
    }

    #[test]
    fn test_same_tick_enumeration_order() {
        let mut detector = detector(vec![vec![proc(30, "/games/gamma"), proc(4, "/games/alpha")]]);
        assert_eq!(ids(&detector.tick().unwrap()), vec![("GAME_STARTED", 3)]);
    }

    #[test]
    fn test_same_tick_lowest_pid() {
        let mut detector = detector(vec![vec![proc(30, "/games/gamma"), proc(4, "/games/alpha")]])
            .with_policy(SameTickPolicy::LowestPid);
        assert_eq!(ids(&detector.tick().unwrap()), vec![("GAME_STARTED", 1)]);
    }

    #[test]
    fn test_second_instance_keeps_game_active() {
        let mut detector = detector(vec![
            vec![proc(1, "/games/alpha")],
            vec![proc(1, "/games/alpha"), proc(2, "/games/alpha")],
            vec![proc(2, "/games/alpha")],
            vec![],
        ]);

        assert_eq!(ids(&detector.tick().unwrap()), vec![("GAME_STARTED", 1)]);
        assert!(detector.tick().unwrap().is_empty());
        assert!(detector.tick().unwrap().is_empty());
        assert_eq!(ids(&detector.tick().unwrap()), vec![("GAME_STOPPED", 1)]);
    }

    #[test]
    fn test_blacklisted_games_never_start() {
        let mut detector = detector(vec![
            vec![proc(1, "/games/alpha")],
            vec![proc(1, "/games/alpha"), proc(2, "/games/gamma")],
        ])
        .with_blacklist(HashSet::from([Snowflake::new(1)]));

        assert!(detector.tick().unwrap().is_empty());
        // A blacklisted game does not block others
        assert_eq!(ids(&detector.tick().unwrap()), vec![("GAME_STARTED", 3)]);
    }

    #[test]
    fn test_enumeration_failure_is_reported() {
        let mut detector = detector(vec![]);
        assert!(matches!(detector.tick(), Err(DetectionError::Enumeration(_))));
    }

    #[test]
    fn test_started_event_carries_process_path() {
        let mut detector = detector(vec![vec![proc(11, "/games/alpha")]]);
        let events = detector.tick().unwrap();
        assert!(matches!(&events[..], [GameEvent::Started { executable, .. }] if executable == "/games/alpha"));
    }

    struct Listing(Vec<DetectableGame>);

    #[async_trait::async_trait]
    impl CatalogSource for Listing {
        async fn fetch(&self, _etag: Option<&str>) -> Result<Fetched, RefreshError> {
            Ok(Fetched::Updated {
                games: self.0.clone(),
                etag: None,
            })
        }
    }

    struct Stalled;

    #[async_trait::async_trait]
    impl CatalogSource for Stalled {
        async fn fetch(&self, _etag: Option<&str>) -> Result<Fetched, RefreshError> {
            std::future::pending().await
        }
    }

    fn always(processes: Vec<ProcessSnapshot>) -> impl FnMut() -> Result<Vec<ProcessSnapshot>, DetectionError> + Send {
        move || Ok(processes.clone())
    }

    #[tokio::test]
    async fn test_running_game_found_after_catalog_install() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(GameCatalog::new(dir.path()));
        let mut detector = GameDetector::new(always(vec![proc(11, "/games/alpha")]), Arc::clone(&catalog), Platform::Linux);

        // Catalog still empty (download failed at startup)
        assert!(detector.tick().unwrap().is_empty());
        assert!(detector.tick().unwrap().is_empty());

        let alpha = DetectableGame::new(Snowflake::new(1), "Alpha").with_executable(Platform::Linux, "alpha");
        catalog.refresh(&Listing(vec![alpha])).await.unwrap();

        assert_eq!(ids(&detector.tick().unwrap()), vec![("GAME_STARTED", 1)]);
        assert!(detector.tick().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_catalog_install_keeps_blacklist() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(GameCatalog::new(dir.path()));
        let mut detector = GameDetector::new(always(vec![proc(11, "/games/alpha")]), Arc::clone(&catalog), Platform::Linux)
            .with_blacklist(HashSet::from([Snowflake::new(1)]));

        assert!(detector.tick().unwrap().is_empty());
        let alpha = DetectableGame::new(Snowflake::new(1), "Alpha").with_executable(Platform::Linux, "alpha");
        catalog.refresh(&Listing(vec![alpha])).await.unwrap();
        assert!(detector.tick().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stalled_refresh_does_not_delay_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let detector = GameDetector::new(always(Vec::new()), Arc::new(GameCatalog::new(dir.path())), Platform::Linux)
            .with_refresh(Arc::new(Stalled), 7)
            .with_poll_interval(Duration::from_millis(50));
        let (tx, _rx) = mpsc::channel(8);
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(detector.run(tx, stop_rx));

        // Let the first tick enter the download
        tokio::time::sleep(Duration::from_millis(200)).await;
        stop.send_replace(true);

        let finished = tokio::time::timeout(Duration::from_secs(3), task).await;
        assert!(finished.is_ok(), "detector ignored shutdown during a catalog download");
    }

    #[tokio::test]
    async fn test_full_event_channel_does_not_delay_shutdown() {
        let detector = detector(vec![vec![proc(1, "/games/alpha")]]).with_poll_interval(Duration::from_millis(10));
        let (tx, _rx) = mpsc::channel(1);
        tx.send(GameEvent::stopped(Snowflake::new(9))).await.unwrap();
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(detector.run(tx, stop_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.send_replace(true);

        assert!(tokio::time::timeout(Duration::from_secs(3), task).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_emits_events_and_stops_on_shutdown() {
        let detector = detector(vec![vec![proc(1, "/games/alpha")], vec![proc(1, "/games/alpha")]])
            .with_poll_interval(Duration::from_millis(10));
        let (tx, mut rx) = mpsc::channel(8);
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(detector.run(tx, stop_rx));

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.app_id(), Snowflake::new(1));

        stop.send_replace(true);
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
