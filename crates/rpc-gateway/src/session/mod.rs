//! Gateway session
//!
//! Session data, the reconnect backoff and the sans-IO state machine
//! driven by the client worker.

mod backoff;
mod machine;
mod state;

pub use backoff::Backoff;
pub use machine::{Action, Disconnect, GatewayMachine, Next, SessionTiming};
pub use state::{Session, SessionState};
