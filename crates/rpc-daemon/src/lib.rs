//! # rpc-daemon
//!
//! Wires the gateway client to game detection.
//!
//! Detected games flow from the detector to the presence coordinator over
//! a channel, and the coordinator publishes them through the gateway
//! handle.

pub mod coordinator;
pub mod runtime;

pub use coordinator::{PresenceCoordinator, PresenceSink};
pub use runtime::{shutdown_signal, Daemon};
