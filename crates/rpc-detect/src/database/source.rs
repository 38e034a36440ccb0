//! Remote source of the detectable games list

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use rpc_core::{DetectableGame, Platform, Snowflake};
use serde::Deserialize;

use crate::error::RefreshError;

/// API path of the detectable applications list
pub const DETECTABLE_PATH: &str = "/api/v9/applications/detectable";

/// Bound for one catalog download including the body
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of asking the source for a new catalog
#[derive(Debug)]
pub enum Fetched {
    /// The cached version (by ETag) is still current
    NotModified,
    /// A complete new list
    Updated {
        games: Vec<DetectableGame>,
        etag: Option<String>,
    },
}

/// Where catalog downloads come from
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Download the list; `etag` is the version already cached
    async fn fetch(&self, etag: Option<&str>) -> Result<Fetched, RefreshError>;
}

#[derive(Deserialize)]
struct RawApplication {
    id: Snowflake,
    name: String,
    #[serde(default)]
    executables: Vec<RawExecutable>,
    #[serde(default)]
    aliases: Vec<String>,
}

#[derive(Deserialize)]
struct RawExecutable {
    os: String,
    name: String,
}

/// Convert the API list, dropping entries with no usable executable
pub fn parse_catalog(body: &[u8]) -> Result<Vec<DetectableGame>, RefreshError> {
    let raw: Vec<RawApplication> =
        serde_json::from_slice(body).map_err(|e| RefreshError::Decode(e.to_string()))?;

    let games = raw
        .into_iter()
        .filter_map(|app| {
            let game = app
                .executables
                .iter()
                .filter_map(|exe| Platform::from_wire(&exe.os).map(|p| (p, exe.name.as_str())))
                .fold(DetectableGame::new(app.id, app.name), |game, (platform, name)| {
                    game.with_executable(platform, name)
                });
            let game = app.aliases.into_iter().fold(game, DetectableGame::with_alias);
            (!game.executables.is_empty()).then_some(game)
        })
        .collect();

    Ok(games)
}

/// Downloads the list over HTTP with ETag revalidation
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpCatalogSource {
    /// `url` is the full URL of the list, usually `api_base + DETECTABLE_PATH`
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            timeout: DOWNLOAD_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn download(&self, etag: Option<&str>) -> Result<Fetched, RefreshError> {
        let mut request = self.client.get(&self.url);
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_MODIFIED => return Ok(Fetched::NotModified),
            status if !status.is_success() => return Err(RefreshError::Status(status.as_u16())),
            _ => {}
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        let games = parse_catalog(&body)?;

        Ok(Fetched::Updated { games, etag })
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch(&self, etag: Option<&str>) -> Result<Fetched, RefreshError> {
        tracing::debug!(url = %self.url, cached_etag = ?etag, "Downloading detectable games list");
        tokio::time::timeout(self.timeout, self.download(etag))
            .await
            .map_err(|_| RefreshError::Timeout(self.timeout))?
    }
}
