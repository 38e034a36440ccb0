//! Catalog cache file
//!
//! One JSON document holding the complete games list, its ETag and the
//! time of the last refresh. Writes go to a temp file that is renamed
//! over the old one, so a crash never leaves a partial cache.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rpc_core::DetectableGame;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

/// File name inside the data directory
pub const CACHE_FILE: &str = "detectable_games.json";

/// Parsed cache file
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSnapshot {
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub etag: Option<String>,
    pub games: Vec<DetectableGame>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    fetched_at: DateTime<Utc>,
    etag: Option<&'a str>,
    games: Vec<&'a DetectableGame>,
}

/// Path of the cache file in `data_dir`
pub fn cache_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CACHE_FILE)
}

/// Read the cache file; `Ok(None)` when there is none yet
pub async fn read_snapshot(path: &Path) -> std::io::Result<Option<CatalogSnapshot>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Atomically replace the cache file
pub async fn write_snapshot<'a>(
    path: &Path,
    fetched_at: DateTime<Utc>,
    etag: Option<&str>,
    games: impl IntoIterator<Item = &'a DetectableGame>,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let snapshot = SnapshotRef {
        fetched_at,
        etag,
        games: games.into_iter().collect(),
    };
    let json = serde_json::to_vec(&snapshot)?;

    let temp_path = path.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(&json).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await
}
