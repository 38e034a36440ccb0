//! tokio-tungstenite transport

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rpc_common::ProxyConfig;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::proxy::open_tunnel;
use super::{Connector, Inbound, Transport};
use crate::error::ConnectError;

/// Default bound for establishing a connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens WebSocket connections, optionally through a proxy
#[derive(Debug, Clone)]
pub struct WsConnector {
    proxy: Option<ProxyConfig>,
    user_agent: Option<String>,
    timeout: Duration,
}

impl WsConnector {
    /// Create a connector for direct connections
    #[must_use]
    pub fn new() -> Self {
        Self {
            proxy: None,
            user_agent: None,
            timeout: CONNECT_TIMEOUT,
        }
    }

    /// Route connections through `proxy`
    #[must_use]
    pub fn with_proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Send `user_agent` with the upgrade request
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Bound the whole connect + handshake
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connect(&self, url: &str) -> Result<WsTransport, ConnectError> {
        let parsed = url::Url::parse(url).map_err(|e| ConnectError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ConnectError::InvalidUrl(format!("{url}: not a WebSocket URL")));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| ConnectError::InvalidUrl(format!("{url}: missing host")))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| ConnectError::InvalidUrl(format!("{url}: missing port")))?;

        let mut request = url
            .into_client_request()
            .map_err(|e| ConnectError::InvalidUrl(e.to_string()))?;
        if let Some(agent) = self.user_agent.as_deref().and_then(|ua| HeaderValue::from_str(ua).ok()) {
            request.headers_mut().insert(USER_AGENT, agent);
        }

        let stream = open_tunnel(host, port, self.proxy.as_ref()).await?;
        let (socket, _response) =
            tokio_tungstenite::client_async_tls_with_config(request, stream, None, None)
                .await
                .map_err(handshake_error)?;

        Ok(WsTransport { socket })
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

fn handshake_error(error: WsError) -> ConnectError {
    match error {
        WsError::Http(response) => ConnectError::Rejected {
            status: response.status().as_u16(),
            retry_after: retry_after(response.headers()),
        },
        WsError::Io(e) => ConnectError::Io(e),
        WsError::Url(e) => ConnectError::InvalidUrl(e.to_string()),
        other => ConnectError::Handshake(other.to_string()),
    }
}

/// `Retry-After` in seconds; the HTTP-date form is not used by the gateway
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn Transport>, ConnectError> {
        let transport = tokio::time::timeout(self.timeout, self.connect(url))
            .await
            .map_err(|_| ConnectError::Timeout)??;
        Ok(Box::new(transport))
    }
}

/// An open WebSocket connection
pub struct WsTransport {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), ConnectError> {
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| match e {
                WsError::Io(io) => ConnectError::Io(io),
                other => ConnectError::Handshake(other.to_string()),
            })
    }

    async fn receive(&mut self) -> Inbound {
        loop {
            match self.socket.next().await {
                Some(Ok(Message::Text(text))) => return Inbound::Text(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Inbound::Text(text),
                    Err(_) => tracing::debug!("Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    return match frame {
                        Some(frame) => Inbound::Closed {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.into_owned(),
                        },
                        None => Inbound::Closed {
                            code: None,
                            reason: "closed without status".to_string(),
                        },
                    };
                }
                // Ping/Pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Inbound::Closed {
                        code: None,
                        reason: e.to_string(),
                    }
                }
                None => {
                    return Inbound::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    }
                }
            }
        }
    }

    async fn close(&mut self, code: u16) {
        let frame = CloseFrame {
            code: WsCloseCode::from(code),
            reason: "".into(),
        };
        if let Err(e) = self.socket.close(Some(frame)).await {
            tracing::trace!(error = %e, "Error while closing WebSocket");
        }
    }
}
