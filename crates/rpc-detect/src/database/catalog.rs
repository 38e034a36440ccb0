//! The game database

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rpc_core::{DetectableGame, Platform};

use super::cache::{cache_path, read_snapshot, write_snapshot};
use super::index::GameIndex;
use super::source::{CatalogSource, Fetched};
use crate::error::RefreshError;

/// Whether a catalog last refreshed at `last_refresh` is due for a download
///
/// Always true with `delay_days == 0` or when it was never refreshed.
pub fn needs_refresh(last_refresh: Option<DateTime<Utc>>, delay_days: u32, now: DateTime<Utc>) -> bool {
    if delay_days == 0 {
        return true;
    }
    last_refresh.is_none_or(|last| now.signed_duration_since(last) >= chrono::Duration::days(i64::from(delay_days)))
}

#[derive(Debug, Default, Clone)]
struct CatalogMeta {
    fetched_at: Option<DateTime<Utc>>,
    etag: Option<String>,
}

/// Detectable games, cached on disk and refreshed from a remote source
///
/// Lookups read an immutable `GameIndex` that refreshes replace whole.
#[derive(Debug)]
pub struct GameCatalog {
    cache_path: PathBuf,
    index: RwLock<Arc<GameIndex>>,
    meta: Mutex<CatalogMeta>,
    // Serializes refreshes
    refresh_lock: tokio::sync::Mutex<()>,
}

impl GameCatalog {
    /// An empty catalog caching into `data_dir`
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            cache_path: cache_path(data_dir),
            index: RwLock::new(Arc::new(GameIndex::default())),
            meta: Mutex::new(CatalogMeta::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// A catalog serving `games` without any cache file behind it
    #[must_use]
    pub fn with_games(data_dir: &Path, games: Vec<DetectableGame>) -> Self {
        let catalog = Self::new(data_dir);
        *catalog.index.write() = Arc::new(GameIndex::new(games));
        catalog
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Current index
    pub fn index(&self) -> Arc<GameIndex> {
        Arc::clone(&self.index.read())
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// When the catalog was last downloaded or revalidated
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.meta.lock().fetched_at
    }

    /// Whether a download is due given `delay_days`
    pub fn is_refresh_due(&self, delay_days: u32) -> bool {
        needs_refresh(self.last_refresh(), delay_days, Utc::now())
    }

    /// Load the cache file into memory
    ///
    /// A missing or unreadable cache yields an empty catalog.
    pub async fn load_cached(&self) -> Arc<GameIndex> {
        match read_snapshot(&self.cache_path).await {
            Ok(Some(snapshot)) => {
                tracing::info!(
                    games = snapshot.games.len(),
                    fetched_at = %snapshot.fetched_at,
                    "Loaded cached detectable games"
                );
                *self.meta.lock() = CatalogMeta {
                    fetched_at: Some(snapshot.fetched_at),
                    etag: snapshot.etag,
                };
                self.install(GameIndex::new(snapshot.games))
            }
            Ok(None) => {
                tracing::debug!(path = %self.cache_path.display(), "No cached detectable games");
                self.index()
            }
            Err(e) => {
                tracing::warn!(path = %self.cache_path.display(), error = %e, "Ignoring unreadable games cache");
                self.index()
            }
        }
    }

    /// Download, validate and install a new catalog
    ///
    /// On error nothing changes: the old index keeps serving lookups and
    /// the old cache file stays on disk.
    pub async fn refresh(&self, source: &dyn CatalogSource) -> Result<Arc<GameIndex>, RefreshError> {
        self.refresh_inner(source, None).await
    }

    /// `refresh` with the download bounded by `fetch_timeout`
    ///
    /// Only the download is bounded. Once it has returned, the cache file
    /// and the in-memory index are always updated together.
    pub async fn refresh_with_timeout(
        &self,
        source: &dyn CatalogSource,
        fetch_timeout: Duration,
    ) -> Result<Arc<GameIndex>, RefreshError> {
        self.refresh_inner(source, Some(fetch_timeout)).await
    }

    async fn refresh_inner(
        &self,
        source: &dyn CatalogSource,
        fetch_timeout: Option<Duration>,
    ) -> Result<Arc<GameIndex>, RefreshError> {
        let _guard = self.refresh_lock.lock().await;

        let current = self.index();
        let etag = if current.is_empty() {
            None
        } else {
            self.meta.lock().etag.clone()
        };

        let fetched = match fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, source.fetch(etag.as_deref()))
                .await
                .map_err(|_| RefreshError::Timeout(limit))??,
            None => source.fetch(etag.as_deref()).await?,
        };

        let now = Utc::now();
        match fetched {
            Fetched::NotModified => {
                if current.is_empty() {
                    return Err(RefreshError::Validation("not modified but nothing cached".to_string()));
                }
                write_snapshot(
                    &self.cache_path,
                    now,
                    etag.as_deref(),
                    current.games().iter().map(|game| &**game),
                )
                .await?;
                self.meta.lock().fetched_at = Some(now);
                tracing::info!(games = current.len(), "Detectable games list unchanged");
                Ok(current)
            }
            Fetched::Updated { games, etag } => {
                if games.is_empty() {
                    return Err(RefreshError::Validation("empty games list".to_string()));
                }
                write_snapshot(&self.cache_path, now, etag.as_deref(), &games).await?;
                tracing::info!(games = games.len(), etag = ?etag, "Downloaded new detectable games list");
                *self.meta.lock() = CatalogMeta {
                    fetched_at: Some(now),
                    etag,
                };
                Ok(self.install(GameIndex::new(games)))
            }
        }
    }

    fn install(&self, index: GameIndex) -> Arc<GameIndex> {
        let index = Arc::new(index);
        *self.index.write() = Arc::clone(&index);
        index
    }

    /// Exact match of an executable name
    pub fn lookup(&self, executable: &str, platform: Platform) -> Option<Arc<DetectableGame>> {
        self.index.read().lookup(executable, platform)
    }

    /// Match a full executable path by its trailing components
    pub fn lookup_path(&self, path: &str, platform: Platform) -> Option<Arc<DetectableGame>> {
        self.index.read().lookup_path(path, platform)
    }
}
