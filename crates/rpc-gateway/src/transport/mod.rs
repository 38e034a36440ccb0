//! Transport layer
//!
//! A duplex text-frame connection to the gateway. The session worker only
//! talks to these traits, so tests can swap in scripted transports.

mod proxy;
mod websocket;

use async_trait::async_trait;

use crate::error::ConnectError;

pub use proxy::open_tunnel;
pub use websocket::{WsConnector, WsTransport};

/// What `Transport::receive` yields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame
    Text(String),
    /// The connection is gone; `code` is absent when no close frame arrived
    Closed { code: Option<u16>, reason: String },
}

/// An open gateway connection
#[async_trait]
pub trait Transport: Send {
    /// Send a text frame
    async fn send(&mut self, text: String) -> Result<(), ConnectError>;

    /// Wait for the next text frame or the end of the connection
    ///
    /// Must be cancel-safe; the worker races it against timers.
    async fn receive(&mut self) -> Inbound;

    /// Close with `code`; errors are ignored
    async fn close(&mut self, code: u16);
}

/// Opens transports
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn Transport>, ConnectError>;
}
