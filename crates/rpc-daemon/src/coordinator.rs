//! Presence coordinator
//!
//! Turns detector events into presence updates: skips blacklisted games,
//! keeps the first active game until it stops, ignores stale stops.
//! Published and cleared games are also reported as activity sessions.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use rpc_core::{Activity, GameEvent, Snowflake};
use rpc_gateway::{ActivitySessions, GatewayHandle};
use tokio::sync::{mpsc, watch};

/// Where presence updates go
pub trait PresenceSink: Send + Sync {
    fn set_presence(&self, activity: Option<Activity>);
}

impl PresenceSink for GatewayHandle {
    fn set_presence(&self, activity: Option<Activity>) {
        GatewayHandle::set_presence(self, activity);
    }
}

/// Where activity session reports go
#[async_trait]
pub trait SessionReporter: Send + Sync {
    async fn report(&self, change: &PresenceChange);
}

/// Reports to the REST API under the current gateway session
pub struct GatewaySessionReporter {
    sessions: ActivitySessions,
    gateway: GatewayHandle,
}

impl GatewaySessionReporter {
    #[must_use]
    pub fn new(sessions: ActivitySessions, gateway: GatewayHandle) -> Self {
        Self { sessions, gateway }
    }
}

#[async_trait]
impl SessionReporter for GatewaySessionReporter {
    async fn report(&self, change: &PresenceChange) {
        let session_id = self.gateway.session_id();
        let result = self
            .sessions
            .report(change.app_id(), change.executable(), change.is_clear(), session_id.as_deref())
            .await;
        match result {
            Ok(()) => tracing::debug!(app_id = %change.app_id(), closed = change.is_clear(), "Activity session updated"),
            Err(e) => tracing::warn!(
                app_id = %change.app_id(),
                closed = change.is_clear(),
                error = %e,
                "Failed to update activity session"
            ),
        }
    }
}

/// What a handled event did to the published presence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceChange {
    Published { app_id: Snowflake, executable: String },
    Cleared { app_id: Snowflake, executable: String },
}

impl PresenceChange {
    pub fn app_id(&self) -> Snowflake {
        match self {
            Self::Published { app_id, .. } | Self::Cleared { app_id, .. } => *app_id,
        }
    }

    pub fn executable(&self) -> &str {
        match self {
            Self::Published { executable, .. } | Self::Cleared { executable, .. } => executable,
        }
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, Self::Cleared { .. })
    }
}

pub struct PresenceCoordinator<S> {
    sink: S,
    blacklist: HashSet<Snowflake>,
    reporter: Option<Arc<dyn SessionReporter>>,
    /// Application id and process path of the published activity
    current: Option<(Snowflake, String)>,
}

impl<S: PresenceSink> PresenceCoordinator<S> {
    #[must_use]
    pub fn new(sink: S, blacklist: HashSet<Snowflake>) -> Self {
        Self {
            sink,
            blacklist,
            reporter: None,
            current: None,
        }
    }

    /// Report every published and cleared game to `reporter`
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn SessionReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn current(&self) -> Option<Snowflake> {
        self.current.as_ref().map(|(id, _)| *id)
    }

    /// Apply one event; returns what changed, if anything
    pub fn handle(&mut self, event: &GameEvent) -> Option<PresenceChange> {
        match event {
            GameEvent::Started { game, executable, at } => {
                if self.blacklist.contains(&game.id) {
                    tracing::debug!(app_id = %game.id, name = %game.name, "Blacklisted game not published");
                    return None;
                }
                if let Some((current, _)) = &self.current {
                    tracing::debug!(app_id = %game.id, active = %current, "Another game is already published");
                    return None;
                }

                tracing::info!(app_id = %game.id, name = %game.name, "Publishing activity");
                self.sink.set_presence(Some(Activity::from_game(game, *at)));
                self.current = Some((game.id, executable.clone()));
                Some(PresenceChange::Published {
                    app_id: game.id,
                    executable: executable.clone(),
                })
            }
            GameEvent::Stopped { id, .. } => {
                let executable = match self.current.take() {
                    Some((current, executable)) if current == *id => executable,
                    other => {
                        self.current = other;
                        tracing::debug!(app_id = %id, "Ignoring stop of an unpublished game");
                        return None;
                    }
                };

                tracing::info!(app_id = %id, "Clearing activity");
                self.sink.set_presence(None);
                Some(PresenceChange::Cleared { app_id: *id, executable })
            }
        }
    }

    /// Consume events until the detector goes away or shutdown
    pub async fn run(mut self, mut events: mpsc::Receiver<GameEvent>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                () = wait_for_shutdown(&mut shutdown) => break,
            };
            let Some(event) = event else {
                break;
            };

            let Some(change) = self.handle(&event) else {
                continue;
            };
            if let Some(reporter) = &self.reporter {
                tokio::select! {
                    () = reporter.report(&change) => {}
                    () = wait_for_shutdown(&mut shutdown) => break,
                }
            }
        }
        tracing::debug!("Presence coordinator stopped");
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also means shutdown
    let _ = shutdown.wait_for(|stop| *stop).await;
}
