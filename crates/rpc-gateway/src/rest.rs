//! REST plumbing shared by gateway discovery and the game catalog download
//!
//! Resolves the API/gateway endpoints from the configured host and builds a
//! `reqwest` client carrying the account's identity headers.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use rpc_common::ProxyConfig;
use url::Url;

use crate::error::ConnectError;
use crate::properties::ClientProperties;

/// Platform host used when no custom host is configured
pub const DEFAULT_HOST: &str = "discord.com";

/// Gateway used when discovery fails
pub const FALLBACK_GATEWAY_URL: &str = "wss://gateway.discord.gg";

const REST_TIMEOUT: Duration = Duration::from_secs(15);

const SUPER_PROPERTIES: &str = "x-super-properties";

/// Where the REST API and the gateway live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// `scheme://host[:port]` of the REST API, no trailing slash
    pub api_base: String,
    /// Gateway URL to use directly, skipping discovery
    pub gateway_override: Option<String>,
}

impl Endpoints {
    /// Resolve endpoints from an optional custom host
    ///
    /// Accepts a bare host (`chat.example.org`), an `http(s)://` API URL or a
    /// full `ws(s)://` gateway URL.
    pub fn from_custom_host(custom_host: Option<&str>) -> Result<Self, ConnectError> {
        let Some(host) = custom_host.map(str::trim).filter(|h| !h.is_empty()) else {
            return Ok(Self {
                api_base: format!("https://{DEFAULT_HOST}"),
                gateway_override: None,
            });
        };

        if !host.contains("://") {
            return Ok(Self {
                api_base: format!("https://{}", host.trim_end_matches('/')),
                gateway_override: None,
            });
        }

        let url = Url::parse(host).map_err(|e| ConnectError::InvalidUrl(format!("{host}: {e}")))?;
        let authority = match (url.host_str(), url.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            (None, _) => return Err(ConnectError::InvalidUrl(format!("{host}: missing host"))),
        };

        match url.scheme() {
            "http" | "https" => Ok(Self {
                api_base: format!("{}://{authority}", url.scheme()),
                gateway_override: None,
            }),
            "ws" | "wss" => Ok(Self {
                api_base: format!(
                    "{}://{authority}",
                    if url.scheme() == "ws" { "http" } else { "https" }
                ),
                gateway_override: Some(host.trim_end_matches('/').to_string()),
            }),
            other => Err(ConnectError::InvalidUrl(format!("unsupported scheme '{other}'"))),
        }
    }

    /// Absolute URL of an API path such as `/api/v9/gateway`
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }
}

/// Build the HTTP client used for REST calls
///
/// Bot tokens send neither a browser user agent nor super properties.
pub fn rest_client(
    token: &str,
    properties: &ClientProperties,
    proxy: Option<&ProxyConfig>,
) -> Result<reqwest::Client, ConnectError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

    let mut auth = HeaderValue::from_str(token)
        .map_err(|_| ConnectError::InvalidUrl("token contains invalid header characters".to_string()))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);

    if !token.starts_with("Bot") {
        if let Ok(value) = HeaderValue::from_str(properties.user_agent()) {
            headers.insert(USER_AGENT, value);
        }
        if let Ok(value) = HeaderValue::from_str(&properties.encode()) {
            headers.insert(HeaderName::from_static(SUPER_PROPERTIES), value);
        }
    }

    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(REST_TIMEOUT);

    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy.url()).map_err(|e| ConnectError::Proxy(e.to_string()))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ConnectError::Handshake(format!("failed to build HTTP client: {e}")))
}
