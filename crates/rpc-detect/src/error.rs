//! Game detection errors

use std::time::Duration;
use thiserror::Error;

/// Failure downloading or installing a new catalog
///
/// Never fatal: the previous catalog stays in use.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Catalog download timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to decode catalog: {0}")]
    Decode(String),

    #[error("Catalog rejected: {0}")]
    Validation(String),

    #[error("Cache file error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for RefreshError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// Failure enumerating processes for one tick
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Process enumeration failed: {0}")]
    Enumeration(String),

    #[error("Game detection is not supported on this platform")]
    UnsupportedPlatform,
}
