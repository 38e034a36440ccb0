//! Rich presence activity
//!
//! The "what the user is doing" payload published through the gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::entities::DetectableGame;
use crate::value_objects::Snowflake;

/// Activity kind as understood by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActivityType {
    /// "Playing {name}"
    Playing = 0,
    /// "Listening to {name}"
    Listening = 2,
    /// "Watching {name}"
    Watching = 3,
    /// Custom status line
    Custom = 4,
}

impl ActivityType {
    /// Create an `ActivityType` from its raw wire value
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Playing),
            2 => Some(Self::Listening),
            3 => Some(Self::Watching),
            4 => Some(Self::Custom),
            _ => None,
        }
    }

    /// Get the raw wire value
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl Serialize for ActivityType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for ActivityType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid activity type: {value}")))
    }
}

/// Image keys shown next to the activity
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityAssets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_image: Option<String>,
}

/// A single rich presence activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Application the activity belongs to
    pub application_id: Snowflake,

    /// Display name
    pub name: String,

    /// Activity kind
    #[serde(rename = "type")]
    pub kind: ActivityType,

    /// When the activity started (sent as `timestamps.start` in unix ms)
    #[serde(rename = "timestamps", with = "start_timestamp")]
    pub started_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<ActivityAssets>,
}

impl Activity {
    /// Create a "Playing" activity
    #[must_use]
    pub fn playing(application_id: Snowflake, name: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            application_id,
            name: name.into(),
            kind: ActivityType::Playing,
            started_at,
            details: None,
            state: None,
            assets: None,
        }
    }

    /// Create a "Playing" activity for a detected game
    #[must_use]
    pub fn from_game(game: &DetectableGame, started_at: DateTime<Utc>) -> Self {
        Self::playing(game.id, game.name.clone(), started_at)
    }

    /// Set the details line
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Set the state line
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Set image assets
    #[must_use]
    pub fn with_assets(mut self, assets: ActivityAssets) -> Self {
        self.assets = Some(assets);
        self
    }
}

mod start_timestamp {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Timestamps {
        start: i64,
    }

    pub fn serialize<S>(started_at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Timestamps {
            start: started_at.timestamp_millis(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let timestamps = Timestamps::deserialize(deserializer)?;
        Utc.timestamp_millis_opt(timestamps.start)
            .single()
            .ok_or_else(|| serde::de::Error::custom("start timestamp out of range"))
    }
}
