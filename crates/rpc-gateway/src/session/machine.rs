//! Gateway session state machine
//!
//! Pure protocol logic: frames and timer ticks go in, actions come out.
//! The worker owns the transport and carries the actions out.

use rand::Rng;
use std::time::{Duration, Instant};

use super::backoff::Backoff;
use super::state::{Session, SessionState};
use crate::discovery::connect_url;
use crate::error::{ConnectError, GatewayError};
use crate::properties::ClientProperties;
use crate::protocol::{CloseAction, CloseCode, GatewayMessage, IdentifyPayload, OpCode, ResumePayload, UserStatus};

/// Timing knobs of the state machine
#[derive(Debug, Clone)]
pub struct SessionTiming {
    /// How long after a connection loss a resume is still attempted
    pub resume_window: Duration,
    /// First reconnect delay
    pub backoff_base: Duration,
    /// Largest reconnect delay
    pub backoff_ceiling: Duration,
    /// Wait after the remote rate limited us
    pub rate_limit_delay: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            resume_window: Duration::from_secs(120),
            backoff_base: Duration::from_secs(1),
            backoff_ceiling: Duration::from_secs(60),
            rate_limit_delay: Duration::from_secs(60),
        }
    }
}

/// Why the current connection has to go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// The previous heartbeat was never acknowledged
    HeartbeatTimeout,
    /// Remote sent op 7
    ReconnectRequested,
    /// Remote sent op 9
    InvalidSession,
    /// Malformed or out-of-order frame
    Protocol(String),
    /// Transport closed by the remote or lost
    Closed { code: Option<u16>, reason: String },
}

impl Disconnect {
    /// Close code the client sends for a disconnect it initiates
    ///
    /// Anything but 1000 keeps the session resumable on the remote.
    #[must_use]
    pub fn close_code(&self) -> u16 {
        match self {
            Self::HeartbeatTimeout | Self::ReconnectRequested | Self::Closed { .. } => {
                CloseCode::UnknownError.as_u16()
            }
            Self::InvalidSession | Self::Protocol(_) => CloseCode::NORMAL,
        }
    }
}

/// Something the worker must do
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Send a frame
    Send(GatewayMessage),
    /// The session became ready; publish the pending presence
    Ready,
    /// The account status changed in the user settings
    StatusChanged(UserStatus),
    /// Close the transport and call `connection_lost`
    Disconnect(Disconnect),
}

/// What happens after a connection ended
#[derive(Debug)]
pub enum Next {
    /// Reconnect after the delay
    Reconnect(Duration),
    /// Stop for good
    Fatal(GatewayError),
}

/// The gateway session state machine
#[derive(Debug)]
pub struct GatewayMachine {
    session: Session,
    properties: ClientProperties,
    gateway_url: String,
    heartbeat_acked: bool,
    next_heartbeat: Option<Instant>,
    backoff: Backoff,
    timing: SessionTiming,
    /// Last status seen in the user settings
    status: UserStatus,
}

impl GatewayMachine {
    /// Create a machine for `token`, connecting to `gateway_url`
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        properties: ClientProperties,
        gateway_url: impl Into<String>,
        timing: SessionTiming,
    ) -> Self {
        Self {
            session: Session::new(token),
            properties,
            gateway_url: gateway_url.into(),
            heartbeat_acked: true,
            next_heartbeat: None,
            backoff: Backoff::new(timing.backoff_base, timing.backoff_ceiling),
            timing,
            status: UserStatus::default(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn is_ready(&self) -> bool {
        self.session.state() == SessionState::Ready
    }

    /// Account status to publish presence with
    pub fn status(&self) -> UserStatus {
        self.status
    }

    /// When the heartbeat timer fires next, if it runs
    pub fn next_heartbeat(&self) -> Option<Instant> {
        self.next_heartbeat
    }

    fn transition(&mut self, next: Session) {
        if next.state() != self.session.state() {
            tracing::debug!(from = %self.session.state(), to = %next.state(), "Gateway session state change");
        }
        self.session = next;
    }

    /// Start a connection attempt; returns the URL to open
    ///
    /// Resume data older than the resume window is dropped here.
    pub fn begin_connect(&mut self, now: Instant) -> String {
        let resume = self.session.can_resume(now, self.timing.resume_window);
        if !resume && self.session.has_resume_data() {
            tracing::info!("Resume window expired, starting a new session");
            self.transition(self.session.reconnecting(false, now));
        }

        let base = if resume {
            self.session.resume_url().unwrap_or(self.gateway_url.as_str()).to_string()
        } else {
            self.gateway_url.clone()
        };
        self.transition(self.session.in_state(SessionState::Connecting));
        connect_url(&base)
    }

    /// The transport is open
    pub fn connected(&mut self) {
        self.heartbeat_acked = true;
        self.next_heartbeat = None;
        self.transition(self.session.in_state(SessionState::AwaitingHello));
    }

    /// The connection attempt failed
    pub fn connect_failed(&mut self, error: &ConnectError, now: Instant) -> Next {
        self.transition(self.session.reconnecting(true, now));
        let delay = match error {
            ConnectError::Rejected {
                status: 429,
                retry_after,
            } => retry_after.unwrap_or(self.timing.rate_limit_delay),
            _ => self.backoff.next_delay(),
        };
        tracing::warn!(
            error = %error,
            proxy = error.is_proxy(),
            attempt = self.backoff.attempt(),
            retry_in_ms = delay.as_millis() as u64,
            "Gateway connection failed"
        );
        Next::Reconnect(delay)
    }

    /// Handle one inbound frame
    pub fn handle(&mut self, message: GatewayMessage, now: Instant) -> Vec<Action> {
        match message.op {
            OpCode::Hello => self.on_hello(&message, now),
            OpCode::HeartbeatAck => {
                self.heartbeat_acked = true;
                Vec::new()
            }
            OpCode::Heartbeat => vec![Action::Send(GatewayMessage::heartbeat(self.session.sequence()))],
            OpCode::Dispatch => self.on_dispatch(&message),
            OpCode::Reconnect => {
                tracing::info!("Gateway requested reconnect");
                vec![Action::Disconnect(Disconnect::ReconnectRequested)]
            }
            OpCode::InvalidSession => {
                tracing::info!(resumable = ?message.d, "Gateway invalidated the session");
                vec![Action::Disconnect(Disconnect::InvalidSession)]
            }
            op => vec![Action::Disconnect(Disconnect::Protocol(format!(
                "unexpected op code {op} from server"
            )))],
        }
    }

    fn on_hello(&mut self, message: &GatewayMessage, now: Instant) -> Vec<Action> {
        if self.session.state() != SessionState::AwaitingHello {
            return vec![Action::Disconnect(Disconnect::Protocol(format!(
                "Hello received while {}",
                self.session.state()
            )))];
        }
        let Some(hello) = message.as_hello().filter(|h| h.heartbeat_interval > 0) else {
            return vec![Action::Disconnect(Disconnect::Protocol("invalid Hello payload".to_string()))];
        };
        let interval = Duration::from_millis(hello.heartbeat_interval);

        // First beat lands anywhere within one interval
        let jitter = rand::thread_rng().gen_range(0.0..1.0);
        self.next_heartbeat = Some(now + interval.mul_f64(jitter));
        self.heartbeat_acked = true;

        let handshake = match (self.session.session_id(), self.session.sequence()) {
            (Some(session_id), Some(seq)) if self.session.can_resume(now, self.timing.resume_window) => {
                tracing::info!(session_id = %session_id, seq, "Resuming gateway session");
                let frame = GatewayMessage::resume(&ResumePayload {
                    token: self.session.token().to_string(),
                    session_id: session_id.to_string(),
                    seq,
                });
                self.transition(self.session.with_heartbeat(interval, SessionState::Resuming));
                frame
            }
            _ => {
                tracing::info!("Identifying new gateway session");
                let payload =
                    IdentifyPayload::new(self.session.token(), self.properties.clone()).with_status(self.status);
                self.transition(self.session.with_heartbeat(interval, SessionState::Identifying));
                GatewayMessage::identify(&payload)
            }
        };

        vec![Action::Send(handshake)]
    }

    fn on_dispatch(&mut self, message: &GatewayMessage) -> Vec<Action> {
        if let Some(sequence) = message.s {
            self.session.observe_sequence(sequence);
        }

        if let Some(ready) = message.as_ready() {
            if let Some(status) = ready.status() {
                self.status = status;
            }
            tracing::info!(session_id = %ready.session_id, status = %self.status, "Gateway session ready");
            self.transition(self.session.ready(ready.session_id, ready.resume_gateway_url));
            self.backoff.reset();
            return vec![Action::Ready];
        }

        if message.is_resumed() {
            tracing::info!(
                session_id = self.session.session_id().unwrap_or_default(),
                "Gateway session resumed"
            );
            self.transition(self.session.resumed());
            self.backoff.reset();
            return vec![Action::Ready];
        }

        if let Some(status) = message.as_user_settings_update().and_then(|update| update.status()) {
            if status != self.status {
                tracing::info!(from = %self.status, to = %status, "Account status changed");
                self.status = status;
                return vec![Action::StatusChanged(status)];
            }
            return Vec::new();
        }

        tracing::trace!(event = message.t.as_deref().unwrap_or_default(), "Dispatch ignored");
        Vec::new()
    }

    /// Heartbeat timer fired
    ///
    /// A missing ack yields one `Disconnect` and stops the timer, so one
    /// missed ack never causes more than one reconnect.
    pub fn heartbeat_tick(&mut self, now: Instant) -> Vec<Action> {
        let Some(deadline) = self.next_heartbeat else {
            return Vec::new();
        };
        if now < deadline {
            return Vec::new();
        }

        if !self.heartbeat_acked {
            tracing::warn!("Heartbeat not acknowledged, connection presumed dead");
            self.next_heartbeat = None;
            return vec![Action::Disconnect(Disconnect::HeartbeatTimeout)];
        }

        let interval = self.session.heartbeat_interval().unwrap_or(Duration::from_secs(41));
        let jitter = rand::thread_rng().gen_range(0.9..=1.0);
        self.next_heartbeat = Some(now + interval.mul_f64(jitter));
        self.heartbeat_acked = false;

        tracing::trace!(seq = ?self.session.sequence(), "Sending heartbeat");
        vec![Action::Send(GatewayMessage::heartbeat(self.session.sequence()))]
    }

    /// The connection ended; decide how to continue
    pub fn connection_lost(&mut self, reason: Disconnect, now: Instant) -> Next {
        self.next_heartbeat = None;

        let (keep_resume, delay) = match &reason {
            Disconnect::HeartbeatTimeout | Disconnect::ReconnectRequested => (true, self.backoff.next_delay()),
            Disconnect::InvalidSession | Disconnect::Protocol(_) => (false, self.backoff.next_delay()),
            Disconnect::Closed { code, reason: text } => match CloseCode::action_for(*code) {
                CloseAction::Resume => (true, self.backoff.next_delay()),
                CloseAction::Reidentify => (false, self.backoff.next_delay()),
                CloseAction::RateLimited => (false, self.timing.rate_limit_delay),
                CloseAction::Fatal => {
                    tracing::error!(code = ?code, reason = %text, "Gateway rejected the token");
                    self.transition(self.session.disconnected());
                    return Next::Fatal(GatewayError::Auth(format!(
                        "{} ({})",
                        CloseCode::AuthenticationFailed.description(),
                        text
                    )));
                }
            },
        };

        tracing::info!(
            reason = ?reason,
            resume = keep_resume && self.session.has_resume_data(),
            retry_in_ms = delay.as_millis() as u64,
            "Gateway connection lost"
        );
        self.transition(self.session.reconnecting(keep_resume, now));
        Next::Reconnect(delay)
    }

    /// Explicit shutdown
    pub fn shutdown(&mut self) {
        self.next_heartbeat = None;
        self.transition(self.session.disconnected());
    }
}
