//! Gateway URL discovery

use serde::Deserialize;

use crate::rest::{Endpoints, FALLBACK_GATEWAY_URL};

/// Query string appended to every gateway URL
pub const GATEWAY_QUERY: &str = "/?v=9&encoding=json";

#[derive(Deserialize)]
struct GatewayResponse {
    url: String,
}

/// Find the gateway URL for `endpoints`
///
/// Uses the configured override if any, otherwise `GET /api/v9/gateway`.
/// Failures fall back to the public gateway.
pub async fn discover_gateway_url(client: &reqwest::Client, endpoints: &Endpoints) -> String {
    if let Some(url) = &endpoints.gateway_override {
        return url.clone();
    }

    let url = endpoints.api_url("/api/v9/gateway");
    let result = async {
        client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<GatewayResponse>()
            .await
    }
    .await;

    match result {
        Ok(response) => {
            tracing::debug!(gateway_url = %response.url, "Discovered gateway URL");
            response.url
        }
        Err(e) => {
            tracing::warn!(error = %e, fallback = FALLBACK_GATEWAY_URL, "Gateway discovery failed");
            FALLBACK_GATEWAY_URL.to_string()
        }
    }
}

/// Full URL to open a WebSocket against
#[must_use]
pub fn connect_url(gateway_url: &str) -> String {
    format!("{}{GATEWAY_QUERY}", gateway_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_url() {
        assert_eq!(
            connect_url("wss://gateway.discord.gg"),
            "wss://gateway.discord.gg/?v=9&encoding=json"
        );
        assert_eq!(connect_url("ws://127.0.0.1:1/"), "ws://127.0.0.1:1/?v=9&encoding=json");
    }

    #[tokio::test]
    async fn test_override_skips_request() {
        let endpoints = Endpoints {
            api_base: "http://127.0.0.1:9".to_string(),
            gateway_override: Some("ws://127.0.0.1:9".to_string()),
        };
        let url = discover_gateway_url(&reqwest::Client::new(), &endpoints).await;
        assert_eq!(url, "ws://127.0.0.1:9");
    }

    #[tokio::test]
    async fn test_unreachable_api_falls_back() {
        let endpoints = Endpoints {
            // Port 9 (discard) is closed on test machines
            api_base: "http://127.0.0.1:9".to_string(),
            gateway_override: None,
        };
        let url = discover_gateway_url(&reqwest::Client::new(), &endpoints).await;
        assert_eq!(url, FALLBACK_GATEWAY_URL);
    }
}
