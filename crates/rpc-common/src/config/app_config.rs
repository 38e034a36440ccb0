//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use rpc_core::Snowflake;
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Name used for the data directory and the user agent of REST calls
pub const APP_NAME: &str = "endcord-rpc";

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub detection: DetectionConfig,
    pub log: LogConfig,
}

/// Gateway connection settings
#[derive(Clone)]
pub struct GatewayConfig {
    /// Account token used for Identify/Resume
    pub token: String,
    /// Custom API host (or full `ws://`/`wss://` gateway URL)
    pub custom_host: Option<String>,
    /// Optional HTTP/SOCKS5 proxy
    pub proxy: Option<ProxyConfig>,
    /// Which client properties preset to identify with
    pub client_properties: ClientPropertiesVariant,
    /// Overrides the preset's user agent
    pub custom_user_agent: Option<String>,
}

// Keep the token out of logs
impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("token", &"<redacted>")
            .field("custom_host", &self.custom_host)
            .field("proxy", &self.proxy)
            .field("client_properties", &self.client_properties)
            .field("custom_user_agent", &self.custom_user_agent)
            .finish()
    }
}

/// Game detection settings
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub enabled: bool,
    /// Application ids that are never published
    pub blacklist: HashSet<Snowflake>,
    /// Days between detectable-games list downloads (0 = always)
    pub refresh_delay_days: u32,
    pub poll_interval: Duration,
    pub same_tick_policy: SameTickPolicy,
    /// Directory holding the cached games list
    pub data_dir: PathBuf,
}

/// Logging settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

/// Client properties preset sent on Identify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientPropertiesVariant {
    /// Mimics the native desktop client
    #[default]
    Default,
    /// Mimics a generic web client
    Anonymous,
}

impl ClientPropertiesVariant {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "default" => Some(Self::Default),
            "anonymous" => Some(Self::Anonymous),
            _ => None,
        }
    }
}

/// How to order games that appear on the very same detection tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameTickPolicy {
    /// First process in enumeration order wins
    #[default]
    EnumerationOrder,
    /// Process with the lowest pid wins
    LowestPid,
}

impl SameTickPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "enumeration_order" => Some(Self::EnumerationOrder),
            "lowest_pid" => Some(Self::LowestPid),
            _ => None,
        }
    }
}

/// Supported proxy schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyScheme {
    /// HTTP CONNECT tunnel
    Http,
    Socks5,
}

impl ProxyScheme {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Socks5 => "socks5",
        }
    }
}

/// Proxy endpoint (`scheme://host:port`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
}

impl ProxyConfig {
    /// Parse a proxy URL, accepting only `http` and `socks5` schemes
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue("RPC_PROXY", format!("{value}: {reason}"));

        let url = url::Url::parse(value.trim()).map_err(|e| invalid(&e.to_string()))?;
        let scheme = match url.scheme() {
            "http" => ProxyScheme::Http,
            "socks5" | "socks5h" => ProxyScheme::Socks5,
            other => return Err(invalid(&format!("unsupported scheme '{other}'"))),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?
            .to_string();
        let port = url.port().ok_or_else(|| invalid("missing port"))?;

        Ok(Self { scheme, host, port })
    }

    /// `host:port` of the proxy itself
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full proxy URL
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}://{}", self.scheme.as_str(), self.address())
    }
}

// Default value functions
fn default_refresh_delay_days() -> u32 {
    7
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(key, value.to_string())),
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key, value.to_string()))
}

fn parse_blacklist(value: &str) -> Result<HashSet<Snowflake>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Snowflake::parse(s)
                .map_err(|_| ConfigError::InvalidValue("RPC_GAMES_BLACKLIST", s.to_string()))
        })
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = non_empty(var("RPC_TOKEN")).ok_or(ConfigError::MissingVar("RPC_TOKEN"))?;

        let proxy = non_empty(var("RPC_PROXY"))
            .map(|p| ProxyConfig::parse(&p))
            .transpose()?;

        let client_properties = match non_empty(var("RPC_CLIENT_PROPERTIES")) {
            Some(v) => ClientPropertiesVariant::parse(&v)
                .ok_or(ConfigError::InvalidValue("RPC_CLIENT_PROPERTIES", v))?,
            None => ClientPropertiesVariant::default(),
        };

        let same_tick_policy = match non_empty(var("RPC_SAME_TICK_POLICY")) {
            Some(v) => SameTickPolicy::parse(&v)
                .ok_or(ConfigError::InvalidValue("RPC_SAME_TICK_POLICY", v))?,
            None => SameTickPolicy::default(),
        };

        let poll_interval_secs: u64 = match non_empty(var("RPC_POLL_INTERVAL_SECS")) {
            Some(v) => parse_number("RPC_POLL_INTERVAL_SECS", &v)?,
            None => default_poll_interval_secs(),
        };
        if poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue("RPC_POLL_INTERVAL_SECS", "0".to_string()));
        }

        Ok(Self {
            gateway: GatewayConfig {
                token,
                custom_host: non_empty(var("RPC_CUSTOM_HOST")),
                proxy,
                client_properties,
                custom_user_agent: non_empty(var("RPC_CUSTOM_USER_AGENT")),
            },
            detection: DetectionConfig {
                enabled: match non_empty(var("RPC_GAME_DETECTION")) {
                    Some(v) => parse_bool("RPC_GAME_DETECTION", &v)?,
                    None => true,
                },
                blacklist: match non_empty(var("RPC_GAMES_BLACKLIST")) {
                    Some(v) => parse_blacklist(&v)?,
                    None => HashSet::new(),
                },
                refresh_delay_days: match non_empty(var("RPC_GAME_LIST_DOWNLOAD_DELAY")) {
                    Some(v) => parse_number("RPC_GAME_LIST_DOWNLOAD_DELAY", &v)?,
                    None => default_refresh_delay_days(),
                },
                poll_interval: Duration::from_secs(poll_interval_secs),
                same_tick_policy,
                data_dir: non_empty(var("RPC_DATA_DIR"))
                    .map_or_else(default_data_dir, PathBuf::from),
            },
            log: LogConfig {
                level: non_empty(var("RPC_LOG_LEVEL")).unwrap_or_else(default_log_level),
                json: match non_empty(var("RPC_LOG_JSON")) {
                    Some(v) => parse_bool("RPC_LOG_JSON", &v)?,
                    None => false,
                },
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
