//! Account status from the user settings
//!
//! READY carries the settings either as legacy JSON (`user_settings`) or as
//! a base64 `PreloadedUserSettings` protobuf (`user_settings_proto`).
//! Later changes arrive as `USER_SETTINGS_PROTO_UPDATE`. Only the status is
//! read; everything else in the message is skipped.

use base64::Engine;
use serde::{Deserialize, Serialize};

/// Online status of the account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Online,
    Idle,
    Dnd,
    Invisible,
}

impl UserStatus {
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "online" => Some(Self::Online),
            "idle" => Some(Self::Idle),
            "dnd" => Some(Self::Dnd),
            "invisible" => Some(Self::Invisible),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Idle => "idle",
            Self::Dnd => "dnd",
            Self::Invisible => "invisible",
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// PreloadedUserSettings.status -> StatusSettings.status -> StringValue.value
const STATUS_PATH: [u64; 3] = [11, 1, 1];

/// Status stored in a base64 `PreloadedUserSettings` message
pub fn status_from_proto(encoded: &str) -> Option<UserStatus> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let value = STATUS_PATH
        .iter()
        .try_fold(bytes.as_slice(), |message, field| last_field(message, *field))?;
    UserStatus::from_wire(std::str::from_utf8(value).ok()?)
}

/// Payload of the last length-delimited occurrence of `field` in `message`
fn last_field(mut message: &[u8], field: u64) -> Option<&[u8]> {
    let mut found = None;
    while !message.is_empty() {
        let key = read_varint(&mut message)?;
        match key & 0x7 {
            0 => {
                read_varint(&mut message)?;
            }
            1 => message = message.get(8..)?,
            2 => {
                let len = usize::try_from(read_varint(&mut message)?).ok()?;
                let payload = message.get(..len)?;
                message = message.get(len..)?;
                if key >> 3 == field {
                    found = Some(payload);
                }
            }
            5 => message = message.get(4..)?,
            _ => return None,
        }
    }
    found
}

fn read_varint(input: &mut &[u8]) -> Option<u64> {
    let mut value = 0u64;
    for shift in (0..64).step_by(7) {
        let (&byte, rest) = input.split_first()?;
        *input = rest;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
    }
    None
}

/// `user_settings` as sent by servers without protobuf settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyUserSettings {
    #[serde(default)]
    pub status: Option<String>,
}

/// Settings blob inside `USER_SETTINGS_PROTO_UPDATE`
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsProto {
    /// 1 = preloaded user settings
    #[serde(rename = "type")]
    pub kind: u8,
    pub proto: String,
}

/// Payload of the `USER_SETTINGS_PROTO_UPDATE` dispatch
#[derive(Debug, Clone, Deserialize)]
pub struct UserSettingsUpdate {
    pub settings: SettingsProto,
    /// Only the changed fields are included
    #[serde(default)]
    pub partial: bool,
}

impl UserSettingsUpdate {
    /// The new status, if this update carries one
    #[must_use]
    pub fn status(&self) -> Option<UserStatus> {
        if self.settings.kind != 1 {
            return None;
        }
        status_from_proto(&self.settings.proto)
    }
}
