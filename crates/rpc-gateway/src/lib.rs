//! # rpc-gateway
//!
//! Gateway client for publishing rich presence: wire protocol, transport,
//! session state machine and the worker that drives them.

pub mod activity;
pub mod client;
pub mod discovery;
pub mod error;
pub mod properties;
pub mod protocol;
pub mod rest;
pub mod session;
pub mod transport;

pub use activity::ActivitySessions;
pub use client::{GatewayClient, GatewayClientConfig, GatewayHandle};
pub use error::{ActivityError, ConnectError, GatewayError, GatewayResult};
pub use properties::ClientProperties;
pub use rest::{rest_client, Endpoints};
pub use session::{SessionState, SessionTiming};
