//! Session value
//!
//! One `Session` exists per running client. Reconnecting never edits the
//! old value; it builds the next one from what may be carried over.

use std::time::{Duration, Instant};

/// Lifecycle of the gateway session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Not connected; terminal after shutdown or a fatal error
    Disconnected,
    /// Opening the transport
    Connecting,
    /// Transport open, waiting for Hello
    AwaitingHello,
    /// Identify sent, waiting for READY
    Identifying,
    /// Resume sent, waiting for RESUMED
    Resuming,
    /// Session established
    Ready,
    /// Connection lost, waiting to reconnect
    Reconnecting,
}

impl SessionState {
    /// Get the state name for logging
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting_hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Gateway session data
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    sequence: Option<u64>,
    session_id: Option<String>,
    resume_url: Option<String>,
    heartbeat_interval: Option<Duration>,
    state: SessionState,
    disconnected_at: Option<Instant>,
}

impl Session {
    /// A brand new session for `token`
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            sequence: None,
            session_id: None,
            resume_url: None,
            heartbeat_interval: None,
            state: SessionState::Disconnected,
            disconnected_at: None,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn resume_url(&self) -> Option<&str> {
        self.resume_url.as_deref()
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Both halves of the resume key are present
    #[must_use]
    pub fn has_resume_data(&self) -> bool {
        self.session_id.is_some() && self.sequence.is_some()
    }

    /// Resume is possible at `now` given the `window` after the connection loss
    #[must_use]
    pub fn can_resume(&self, now: Instant, window: Duration) -> bool {
        self.has_resume_data()
            && self
                .disconnected_at
                .is_none_or(|lost| now.saturating_duration_since(lost) < window)
    }

    /// Record a dispatch sequence number; never moves backwards
    pub fn observe_sequence(&mut self, sequence: u64) {
        self.sequence = Some(self.sequence.map_or(sequence, |current| current.max(sequence)));
    }

    /// Same session in another state
    #[must_use]
    pub fn in_state(&self, state: SessionState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }

    /// Next session after Hello
    #[must_use]
    pub fn with_heartbeat(&self, interval: Duration, state: SessionState) -> Self {
        Self {
            heartbeat_interval: Some(interval),
            state,
            ..self.clone()
        }
    }

    /// Next session after READY
    #[must_use]
    pub fn ready(&self, session_id: String, resume_url: Option<String>) -> Self {
        Self {
            session_id: Some(session_id),
            resume_url,
            state: SessionState::Ready,
            disconnected_at: None,
            ..self.clone()
        }
    }

    /// Next session after RESUMED
    #[must_use]
    pub fn resumed(&self) -> Self {
        Self {
            state: SessionState::Ready,
            disconnected_at: None,
            ..self.clone()
        }
    }

    /// Next session after the connection was lost
    ///
    /// With `keep_resume` false the session id, sequence and resume URL are
    /// dropped so the next connection identifies fresh.
    #[must_use]
    pub fn reconnecting(&self, keep_resume: bool, now: Instant) -> Self {
        let keep = keep_resume && self.has_resume_data();
        Self {
            token: self.token.clone(),
            sequence: if keep { self.sequence } else { None },
            session_id: if keep { self.session_id.clone() } else { None },
            resume_url: if keep { self.resume_url.clone() } else { None },
            heartbeat_interval: None,
            state: SessionState::Reconnecting,
            disconnected_at: Some(self.disconnected_at.unwrap_or(now)),
        }
    }

    /// Terminal session after shutdown or a fatal error
    #[must_use]
    pub fn disconnected(&self) -> Self {
        Self {
            heartbeat_interval: None,
            state: SessionState::Disconnected,
            ..self.clone()
        }
    }
}
