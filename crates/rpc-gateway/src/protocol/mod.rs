//! Gateway protocol definitions
//!
//! Op codes, message format, payloads, close codes, user settings and the
//! frame codec.

pub mod codec;
mod close_codes;
mod messages;
mod opcodes;
mod payloads;
mod settings;

pub use close_codes::{CloseAction, CloseCode};
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{
    HelloPayload, IdentifyPayload, PresenceUpdatePayload, ReadyPayload, ResumePayload,
};
pub use settings::{status_from_proto, UserSettingsUpdate, UserStatus};
