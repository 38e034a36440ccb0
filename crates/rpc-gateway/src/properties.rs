//! Client properties
//!
//! The identity object sent with Identify and, base64-encoded, as the
//! `X-Super-Properties` header of REST calls. Two presets exist: `Default`
//! looks like the native desktop client, `Anonymous` like a web browser.

use base64::Engine;
use rpc_common::ClientPropertiesVariant;
use serde::{Deserialize, Serialize};
use std::env;

/// Desktop client version advertised by the default preset
pub const CLIENT_VERSION: &str = "0.0.115";

const USER_AGENT_WEB: &str = "Mozilla/5.0 (%OS; rv:145.0) Gecko/20100101 Firefox/145.0";
const USER_AGENT_DESKTOP: &str = "Mozilla/5.0 (%OS) AppleWebKit/537.36 (KHTML, like Gecko) discord/0.0.115 Chrome/138.0.7204.251 Electron/37.6.0 Safari/537.36";

const LINUX_UA_OS: &str = "X11; Linux x86_64";
const WINDOWS_UA_OS: &str = "Windows NT %VER; Win64; x64";
const MACOS_UA_OS: &str = "Macintosh; Intel Mac OS X %VER";
const WINDOWS_DEFAULT_VERSION: &str = "10.0";
const MACOS_DEFAULT_VERSION: &str = "15.3";

// Bits cleared from a random v4 uuid to form a launch signature
const LAUNCH_SIGNATURE_MASK: u128 = 0x0080_1010_0810_0800_2081_0040_0100_0800;

/// Client identity sent to the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProperties {
    pub os: String,
    pub browser: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub release_channel: String,
    pub os_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_arch: Option<String>,
    pub system_locale: String,
    pub has_client_mods: bool,
    pub browser_user_agent: String,
    pub browser_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referring_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_current: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referring_domain_current: Option<String>,
    pub client_build_number: Option<u64>,
    pub client_event_source: Option<String>,
    pub launch_signature: String,
    pub client_launch_id: String,
    pub client_heartbeat_session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_app_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_fast_connect: Option<bool>,
}

impl ClientProperties {
    /// Build the properties for `variant` on this machine
    ///
    /// A custom user agent replaces the preset's and drives the browser version.
    #[must_use]
    pub fn build(variant: ClientPropertiesVariant, custom_user_agent: Option<&str>) -> Self {
        let locale = system_locale(env::var("LC_ALL").ok(), env::var("LANG").ok());
        match variant {
            ClientPropertiesVariant::Default => Self::desktop(locale, custom_user_agent),
            ClientPropertiesVariant::Anonymous => Self::web(locale, custom_user_agent),
        }
    }

    fn desktop(system_locale: String, custom_user_agent: Option<&str>) -> Self {
        let os_version = sysinfo::System::kernel_version().unwrap_or_default();
        let arch = if cfg!(target_os = "macos") { "arm64" } else { "x64" };
        let user_agent = custom_user_agent
            .map_or_else(|| user_agent_for_os(USER_AGENT_DESKTOP, &os_version), str::to_string);

        let window_manager = cfg!(target_os = "linux").then(|| {
            format!(
                "{},{}",
                env::var("XDG_CURRENT_DESKTOP").unwrap_or_else(|_| "unknown".to_string()),
                env::var("GDMSESSION").unwrap_or_else(|_| "unknown".to_string()),
            )
        });

        Self {
            os: os_name().to_string(),
            browser: "Discord Client".to_string(),
            device: None,
            release_channel: "stable".to_string(),
            os_version,
            os_arch: Some(arch.to_string()),
            app_arch: Some(arch.to_string()),
            system_locale,
            has_client_mods: false,
            browser_version: browser_version(&user_agent),
            client_version: client_version(&user_agent),
            browser_user_agent: user_agent,
            window_manager,
            runtime_environment: Some("native".to_string()),
            referrer: None,
            referring_domain: None,
            referrer_current: None,
            referring_domain_current: None,
            client_build_number: None,
            client_event_source: None,
            launch_signature: launch_signature(),
            client_launch_id: uuid::Uuid::new_v4().to_string(),
            client_heartbeat_session_id: uuid::Uuid::new_v4().to_string(),
            client_app_state: None,
            is_fast_connect: None,
        }
    }

    fn web(system_locale: String, custom_user_agent: Option<&str>) -> Self {
        let user_agent = custom_user_agent
            .map_or_else(|| user_agent_for_os(USER_AGENT_WEB, ""), str::to_string);

        Self {
            os: os_name().to_string(),
            browser: "Mozilla".to_string(),
            device: Some(String::new()),
            release_channel: "stable".to_string(),
            os_version: String::new(),
            os_arch: None,
            app_arch: None,
            system_locale,
            has_client_mods: false,
            browser_version: browser_version(&user_agent),
            client_version: None,
            browser_user_agent: user_agent,
            window_manager: None,
            runtime_environment: None,
            referrer: Some(String::new()),
            referring_domain: Some(String::new()),
            referrer_current: Some(String::new()),
            referring_domain_current: Some(String::new()),
            client_build_number: None,
            client_event_source: None,
            launch_signature: launch_signature(),
            client_launch_id: uuid::Uuid::new_v4().to_string(),
            client_heartbeat_session_id: uuid::Uuid::new_v4().to_string(),
            client_app_state: None,
            is_fast_connect: None,
        }
    }

    /// Copy with the extra fields the gateway Identify carries
    #[must_use]
    pub fn for_gateway(&self) -> Self {
        Self {
            client_app_state: Some("unfocused".to_string()),
            is_fast_connect: Some(false),
            ..self.clone()
        }
    }

    /// User agent for HTTP and WebSocket requests
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.browser_user_agent
    }

    /// Base64 of the compact JSON, the `X-Super-Properties` header value
    #[must_use]
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        base64::engine::general_purpose::STANDARD.encode(json)
    }
}

const fn os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "Windows"
    } else if cfg!(target_os = "macos") {
        "Mac OS X"
    } else {
        "Linux"
    }
}

/// `LC_ALL`, then `LANG`, without the encoding suffix
fn system_locale(lc_all: Option<String>, lang: Option<String>) -> String {
    lc_all
        .filter(|v| !v.is_empty())
        .or(lang.filter(|v| !v.is_empty()))
        .and_then(|v| v.split('.').next().map(str::to_string))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "en_US".to_string())
}

fn user_agent_for_os(template: &str, os_version: &str) -> String {
    let os = if cfg!(target_os = "windows") {
        let version = if os_version.is_empty() { WINDOWS_DEFAULT_VERSION } else { os_version };
        let short: Vec<&str> = version.split('.').take(2).collect();
        WINDOWS_UA_OS.replace("%VER", &short.join("."))
    } else if cfg!(target_os = "macos") {
        let version = if os_version.is_empty() { MACOS_DEFAULT_VERSION } else { os_version };
        MACOS_UA_OS.replace("%VER", &version.replace('.', "_"))
    } else {
        LINUX_UA_OS.to_string()
    };
    template.replace("%OS", &os)
}

/// Version digits following `marker` in `user_agent`
fn version_after<'a>(user_agent: &'a str, marker: &str) -> Option<&'a str> {
    let start = user_agent.find(marker)? + marker.len();
    let rest = &user_agent[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}

fn browser_version(user_agent: &str) -> String {
    let safari_version = || {
        user_agent
            .contains("Safari/")
            .then(|| version_after(user_agent, "Version/"))
            .flatten()
    };
    version_after(user_agent, "Firefox/")
        .or_else(safari_version)
        .or_else(|| version_after(user_agent, "Electron/"))
        .or_else(|| version_after(user_agent, "Chrome/"))
        .unwrap_or_default()
        .to_string()
}

fn client_version(user_agent: &str) -> Option<String> {
    version_after(user_agent, "discord/").map(str::to_string)
}

fn launch_signature() -> String {
    let value = uuid::Uuid::new_v4().as_u128() & !LAUNCH_SIGNATURE_MASK;
    uuid::Uuid::from_u128(value).to_string()
}
