//! Gateway client error types

use std::time::Duration;
use thiserror::Error;

/// Failure to establish a connection
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Endpoint URL could not be used
    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(String),

    /// Proxy refused or failed the tunnel
    #[error("Proxy error: {0}")]
    Proxy(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS or WebSocket handshake failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Remote answered the upgrade with a non-101 status
    #[error("Gateway rejected the connection with HTTP {status}")]
    Rejected {
        status: u16,
        /// Delay requested through `Retry-After`
        retry_after: Option<Duration>,
    },

    #[error("Connection attempt timed out")]
    Timeout,
}

impl ConnectError {
    /// Whether the failure happened at the proxy rather than the remote
    #[must_use]
    pub fn is_proxy(&self) -> bool {
        matches!(self, Self::Proxy(_))
    }

}

/// Gateway session error
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Token rejected; user action required
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Malformed frame or unexpected op code sequence
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Only authentication failures stop the client
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failure reporting an activity session
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),
}
