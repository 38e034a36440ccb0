//! Gateway payload definitions
//!
//! Payloads the client sends (Identify, Resume, Presence Update) and the
//! server payloads it reads (Hello, READY).

use rpc_core::Activity;
use serde::{Deserialize, Serialize};

use super::settings::{status_from_proto, LegacyUserSettings, UserStatus};
use crate::properties::ClientProperties;

/// Payload for op 10 (Hello)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Account token
    pub token: String,

    /// Client properties, gateway flavour
    pub properties: ClientProperties,

    /// Capability flags (user accounts)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<u64>,

    /// Intent flags (bot accounts)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intents: Option<u64>,

    /// Whether payload compression is supported
    pub compress: bool,

    /// Presence to start the session with
    pub presence: PresenceUpdatePayload,
}

impl IdentifyPayload {
    /// Capabilities sent by user accounts
    pub const DEFAULT_CAPABILITIES: u64 = 30_717;
    /// Intents sent by bot accounts
    pub const DEFAULT_INTENTS: u64 = 50_364_033;

    /// Build an Identify payload
    ///
    /// Tokens starting with `Bot` send intents instead of capabilities.
    #[must_use]
    pub fn new(token: impl Into<String>, properties: ClientProperties) -> Self {
        let token = token.into();
        let is_bot = token.starts_with("Bot");
        Self {
            capabilities: (!is_bot).then_some(Self::DEFAULT_CAPABILITIES),
            intents: is_bot.then_some(Self::DEFAULT_INTENTS),
            token,
            properties,
            compress: false,
            presence: PresenceUpdatePayload::initial(UserStatus::Online),
        }
    }

    /// Start the session with `status` instead of online
    #[must_use]
    pub fn with_status(mut self, status: UserStatus) -> Self {
        self.presence.status = status;
        self
    }
}

/// Payload for op 3 (Presence Update)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUpdatePayload {
    pub status: UserStatus,

    /// Unix ms since the client went idle (0 when not idle)
    pub since: u64,

    /// Activities to show; empty clears rich presence
    pub activities: Vec<Activity>,

    pub afk: bool,
}

impl PresenceUpdatePayload {
    /// Initial presence sent with Identify
    #[must_use]
    pub fn initial(status: UserStatus) -> Self {
        Self {
            status,
            since: 0,
            activities: Vec::new(),
            afk: false,
        }
    }

    /// Presence publishing `activity`, or clearing it with `None`
    ///
    /// Sent as afk so that other sessions of the account keep push
    /// notifications.
    #[must_use]
    pub fn with_activity(status: UserStatus, activity: Option<Activity>) -> Self {
        Self {
            status,
            since: 0,
            activities: activity.into_iter().collect(),
            afk: true,
        }
    }
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Account token
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: u64,
}

/// The fields of the READY dispatch this client uses
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyPayload {
    pub session_id: String,

    /// Gateway URL to use for Resume
    #[serde(default)]
    pub resume_gateway_url: Option<String>,

    #[serde(default)]
    pub user_settings: Option<LegacyUserSettings>,

    /// Base64 protobuf settings; preferred over `user_settings`
    #[serde(default)]
    pub user_settings_proto: Option<String>,
}

impl ReadyPayload {
    /// Account status from whichever settings form the server sent
    #[must_use]
    pub fn status(&self) -> Option<UserStatus> {
        self.user_settings_proto
            .as_deref()
            .and_then(status_from_proto)
            .or_else(|| {
                self.user_settings
                    .as_ref()
                    .and_then(|settings| settings.status.as_deref())
                    .and_then(UserStatus::from_wire)
            })
    }
}
