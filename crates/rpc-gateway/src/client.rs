//! Gateway worker
//!
//! `GatewayClient::connect` owns the transport and the session state machine
//! and is the only code that writes to the wire. Other tasks talk to it
//! through a cloneable `GatewayHandle`.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rpc_common::{GatewayConfig, ProxyConfig};
use rpc_core::Activity;
use tokio::sync::{watch, Notify};

use crate::discovery::discover_gateway_url;
use crate::error::{ConnectError, GatewayError, GatewayResult};
use crate::properties::ClientProperties;
use crate::protocol::{codec, CloseCode, GatewayMessage, PresenceUpdatePayload, UserStatus};
use crate::rest::{rest_client, Endpoints};
use crate::session::{Action, Disconnect, GatewayMachine, Next, SessionState, SessionTiming};
use crate::transport::{Connector, Inbound, Transport, WsConnector};

/// Everything the worker needs to reach and authenticate with the gateway
#[derive(Clone)]
pub struct GatewayClientConfig {
    token: String,
    properties: ClientProperties,
    endpoints: Endpoints,
    proxy: Option<ProxyConfig>,
    timing: SessionTiming,
}

impl GatewayClientConfig {
    /// Config for the public platform
    #[must_use]
    pub fn new(token: impl Into<String>, properties: ClientProperties) -> Self {
        Self {
            token: token.into(),
            properties,
            endpoints: Endpoints {
                api_base: format!("https://{}", crate::rest::DEFAULT_HOST),
                gateway_override: None,
            },
            proxy: None,
            timing: SessionTiming::default(),
        }
    }

    /// Build from the loaded application configuration
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConnectError> {
        let properties = ClientProperties::build(config.client_properties, config.custom_user_agent.as_deref());
        let endpoints = Endpoints::from_custom_host(config.custom_host.as_deref())?;
        Ok(Self::new(config.token.clone(), properties)
            .with_endpoints(endpoints)
            .with_proxy(config.proxy.clone()))
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Connect straight to `url`, skipping discovery
    #[must_use]
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.endpoints.gateway_override = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_timing(mut self, timing: SessionTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn properties(&self) -> &ClientProperties {
        &self.properties
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

impl std::fmt::Debug for GatewayClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClientConfig")
            .field("token", &"<redacted>")
            .field("endpoints", &self.endpoints)
            .field("proxy", &self.proxy)
            .field("timing", &self.timing)
            .finish()
    }
}

/// State shared between the worker and its handles
struct Shared {
    /// Latest requested presence not yet seen by the worker
    pending: Mutex<Option<Option<Activity>>>,
    wake: Notify,
    shutdown: watch::Sender<bool>,
    state: Mutex<SessionState>,
    session_id: Mutex<Option<String>>,
}

impl Shared {
    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn shutdown_signal(&self) {
        let mut rx = self.shutdown.subscribe();
        // The sender lives as long as `self`
        let _ = rx.wait_for(|stop| *stop).await;
    }

    fn publish(&self, machine: &GatewayMachine) {
        *self.state.lock() = machine.state();
        *self.session_id.lock() = machine.session().session_id().map(str::to_string);
    }
}

/// Cloneable handle to a running gateway worker
#[derive(Clone)]
pub struct GatewayHandle {
    shared: Arc<Shared>,
}

impl GatewayHandle {
    /// Publish `activity`, or clear the presence with `None`
    ///
    /// Only the latest request is kept. It goes out immediately when the
    /// session is ready, otherwise as soon as it becomes ready.
    pub fn set_presence(&self, activity: Option<Activity>) {
        *self.shared.pending.lock() = Some(activity);
        self.shared.wake.notify_one();
    }

    /// Close the connection normally and stop the worker
    pub fn shutdown(&self) {
        self.shared.shutdown.send_replace(true);
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Id of the current gateway session, kept while a resume is possible
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.shared.session_id.lock().clone()
    }
}

impl std::fmt::Debug for GatewayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayHandle").field("state", &self.state()).finish()
    }
}

/// Presence the worker is responsible for
#[derive(Debug, Default)]
struct PresenceSlot {
    desired: Option<Activity>,
    status: UserStatus,
    /// A change not yet sent on the wire
    dirty: bool,
}

impl PresenceSlot {
    fn update(&mut self, activity: Option<Activity>) {
        self.desired = activity;
        self.dirty = true;
    }

    fn set_status(&mut self, status: UserStatus) {
        if self.status != status {
            self.status = status;
            self.dirty = true;
        }
    }

    /// Frame to send once the session is ready, if any
    ///
    /// `force` resends anything that differs from a fresh session's
    /// presence, which is online without activities.
    fn take_frame(&mut self, force: bool) -> Option<GatewayMessage> {
        let differs_from_fresh = self.desired.is_some() || self.status != UserStatus::Online;
        if !(self.dirty || (force && differs_from_fresh)) {
            return None;
        }
        self.dirty = false;
        let payload = PresenceUpdatePayload::with_activity(self.status, self.desired.clone());
        Some(GatewayMessage::presence_update(&payload))
    }
}

/// What woke the worker up
enum Event {
    Inbound(Inbound),
    HeartbeatDue,
    PresenceChanged,
    Shutdown,
}

/// The gateway worker
pub struct GatewayClient {
    config: GatewayClientConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
}

impl GatewayClient {
    /// Create a worker connecting over WebSocket (through the proxy if configured)
    #[must_use]
    pub fn new(config: GatewayClientConfig) -> Self {
        let connector = WsConnector::new()
            .with_proxy(config.proxy.clone())
            .with_user_agent(config.properties.user_agent());
        let (shutdown, _) = watch::channel(false);

        Self {
            config,
            connector: Arc::new(connector),
            shared: Arc::new(Shared {
                pending: Mutex::new(None),
                wake: Notify::new(),
                shutdown,
                state: Mutex::new(SessionState::Disconnected),
                session_id: Mutex::new(None),
            }),
        }
    }

    /// Replace the transport factory
    #[must_use]
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// A handle for `set_presence` and `shutdown`
    #[must_use]
    pub fn handle(&self) -> GatewayHandle {
        GatewayHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Connect and keep the session alive until shutdown
    ///
    /// Returns `Ok(())` after `GatewayHandle::shutdown` and an error only for
    /// failures that need user action, such as a rejected token.
    pub async fn connect(self) -> GatewayResult<()> {
        let gateway_url = self.resolve_gateway_url().await?;
        tracing::info!(gateway_url = %gateway_url, "Starting gateway worker");

        let mut machine = GatewayMachine::new(
            self.config.token.clone(),
            self.config.properties.for_gateway(),
            gateway_url,
            self.config.timing.clone(),
        );
        let mut presence = PresenceSlot::default();

        let result = self.run(&mut machine, &mut presence).await;
        if result.is_ok() {
            machine.shutdown();
        }
        self.shared.publish(&machine);
        tracing::info!(state = %machine.state(), "Gateway worker stopped");
        result
    }

    async fn resolve_gateway_url(&self) -> GatewayResult<String> {
        if let Some(url) = &self.config.endpoints.gateway_override {
            return Ok(url.clone());
        }
        let client = rest_client(&self.config.token, &self.config.properties, self.config.proxy.as_ref())?;
        Ok(discover_gateway_url(&client, &self.config.endpoints).await)
    }

    async fn run(&self, machine: &mut GatewayMachine, presence: &mut PresenceSlot) -> GatewayResult<()> {
        // One attempt at a time: the next starts only after this one ended
        loop {
            if self.shared.shutdown_requested() {
                return Ok(());
            }

            let url = machine.begin_connect(Instant::now());
            self.shared.publish(machine);
            tracing::debug!(url = %url, "Connecting to gateway");

            let opened = tokio::select! {
                opened = self.connector.open(&url) => opened,
                () = self.shared.shutdown_signal() => return Ok(()),
            };

            let next = match opened {
                Ok(transport) => {
                    machine.connected();
                    self.shared.publish(machine);
                    match self.drive(machine, transport, presence).await {
                        Some(next) => next,
                        None => return Ok(()),
                    }
                }
                Err(e) => machine.connect_failed(&e, Instant::now()),
            };
            self.shared.publish(machine);

            match next {
                Next::Reconnect(delay) => {
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.shared.shutdown_signal() => return Ok(()),
                    }
                }
                Next::Fatal(e) => return Err(e),
            }
        }
    }

    /// Run one connection; `None` means shutdown was requested
    async fn drive(
        &self,
        machine: &mut GatewayMachine,
        mut transport: Box<dyn Transport>,
        presence: &mut PresenceSlot,
    ) -> Option<Next> {
        loop {
            let heartbeat = machine.next_heartbeat();
            let event = tokio::select! {
                inbound = transport.receive() => Event::Inbound(inbound),
                () = sleep_until(heartbeat) => Event::HeartbeatDue,
                () = self.shared.wake.notified() => Event::PresenceChanged,
                () = self.shared.shutdown_signal() => Event::Shutdown,
            };

            let actions = match event {
                Event::Inbound(Inbound::Text(text)) => match codec::decode(&text) {
                    Ok(Some(message)) => {
                        tracing::trace!(frame = %message, "Received frame");
                        machine.handle(message, Instant::now())
                    }
                    Ok(None) => Vec::new(),
                    Err(e) => vec![Action::Disconnect(Disconnect::Protocol(e.to_string()))],
                },
                Event::Inbound(Inbound::Closed { code, reason }) => {
                    return Some(machine.connection_lost(Disconnect::Closed { code, reason }, Instant::now()));
                }
                Event::HeartbeatDue => machine.heartbeat_tick(Instant::now()),
                Event::PresenceChanged => {
                    if let Some(activity) = self.shared.pending.lock().take() {
                        presence.update(activity);
                    }
                    if machine.is_ready() {
                        presence.take_frame(false).map(Action::Send).into_iter().collect()
                    } else {
                        Vec::new()
                    }
                }
                Event::Shutdown => {
                    tracing::info!("Closing gateway connection");
                    transport.close(CloseCode::NORMAL).await;
                    return None;
                }
            };

            for action in actions {
                match action {
                    Action::Send(message) => {
                        if let Err(e) = send(transport.as_mut(), &message).await {
                            let reason = Disconnect::Closed { code: None, reason: e.to_string() };
                            return Some(machine.connection_lost(reason, Instant::now()));
                        }
                    }
                    Action::Ready => {
                        self.shared.publish(machine);
                        if let Some(activity) = self.shared.pending.lock().take() {
                            presence.update(activity);
                        }
                        presence.set_status(machine.status());
                        if let Some(frame) = presence.take_frame(true) {
                            if let Err(e) = send(transport.as_mut(), &frame).await {
                                let reason = Disconnect::Closed { code: None, reason: e.to_string() };
                                return Some(machine.connection_lost(reason, Instant::now()));
                            }
                        }
                    }
                    Action::StatusChanged(status) => {
                        presence.set_status(status);
                        let frame = if machine.is_ready() { presence.take_frame(false) } else { None };
                        if let Some(frame) = frame {
                            if let Err(e) = send(transport.as_mut(), &frame).await {
                                let reason = Disconnect::Closed { code: None, reason: e.to_string() };
                                return Some(machine.connection_lost(reason, Instant::now()));
                            }
                        }
                    }
                    Action::Disconnect(reason) => {
                        transport.close(reason.close_code()).await;
                        return Some(machine.connection_lost(reason, Instant::now()));
                    }
                }
            }
            self.shared.publish(machine);
        }
    }
}

async fn send(transport: &mut dyn Transport, message: &GatewayMessage) -> GatewayResult<()> {
    let text = codec::encode(message)?;
    tracing::trace!(op = %message.op, "Sending frame");
    transport.send(text).await?;
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
