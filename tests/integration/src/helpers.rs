//! Test helpers for integration tests
//!
//! Provides a mock platform serving the gateway, the detectable games
//! list and the activity session API on one port, and a handle on a daemon running against it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use rpc_common::{AppConfig, AppResult};
use rpc_core::Platform;
use rpc_daemon::Daemon;
use rpc_detect::database::DETECTABLE_PATH;
use rpc_detect::ProcessSource;
use rpc_gateway::protocol::{GatewayMessage, OpCode};
use rpc_gateway::activity::ACTIVITIES_PATH;
use rpc_gateway::SessionTiming;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::fixtures::TEST_TOKEN;

/// How the mock gateway behaves
#[derive(Debug, Clone, Copy)]
pub struct GatewayBehavior {
    pub heartbeat_interval_ms: u64,
    /// Answer heartbeats with op 11
    pub ack_heartbeats: bool,
    /// Send op 9 right after the first READY
    pub invalidate_first_session: bool,
}

impl Default for GatewayBehavior {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1_000,
            ack_heartbeats: true,
            invalidate_first_session: false,
        }
    }
}

impl GatewayBehavior {
    pub fn without_acks(mut self) -> Self {
        self.ack_heartbeats = false;
        self
    }

    pub fn invalidating_first_session(mut self) -> Self {
        self.invalidate_first_session = true;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self
    }
}

/// A frame the client sent, tagged with the connection it arrived on
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    /// 0 for the first connection, 1 for the first reconnect, ...
    pub connection: usize,
    pub frame: GatewayMessage,
}

struct PlatformState {
    behavior: GatewayBehavior,
    games: Value,
    frames: Mutex<Vec<ReceivedFrame>>,
    connections: AtomicUsize,
    catalog_requests: AtomicUsize,
    activity_reports: Mutex<Vec<Value>>,
    invalidated: AtomicBool,
}

/// Mock platform: gateway at `/`, games list at the REST path
pub struct MockPlatform {
    pub addr: SocketAddr,
    state: Arc<PlatformState>,
    _handle: JoinHandle<()>,
}

impl MockPlatform {
    /// Start on a free local port, serving `games` as the detectable list
    pub async fn start(behavior: GatewayBehavior, games: Value) -> Result<Self> {
        let state = Arc::new(PlatformState {
            behavior,
            games,
            frames: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            catalog_requests: AtomicUsize::new(0),
            activity_reports: Mutex::new(Vec::new()),
            invalidated: AtomicBool::new(false),
        });

        let app = Router::new()
            .route("/", get(gateway))
            .route(DETECTABLE_PATH, get(detectable_games))
            .route(ACTIVITIES_PATH, post(activity_session))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Value for `RPC_CUSTOM_HOST`: gateway here, REST API on the same port
    pub fn gateway_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn frames(&self) -> Vec<ReceivedFrame> {
        self.state.frames.lock().clone()
    }

    pub fn frames_with_op(&self, op: OpCode) -> Vec<ReceivedFrame> {
        self.frames().into_iter().filter(|f| f.frame.op == op).collect()
    }

    /// Op code of the first frame sent on `connection`
    pub fn first_op_on(&self, connection: usize) -> Option<OpCode> {
        self.frames()
            .into_iter()
            .find(|f| f.connection == connection)
            .map(|f| f.frame.op)
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn catalog_requests(&self) -> usize {
        self.state.catalog_requests.load(Ordering::SeqCst)
    }

    /// Bodies posted to the activity session API, in order
    pub fn activity_reports(&self) -> Vec<Value> {
        self.state.activity_reports.lock().clone()
    }

    /// Poll until `check` holds for the recorded frames or `timeout` passes
    pub async fn wait_for_frames(&self, timeout: Duration, check: impl Fn(&[ReceivedFrame]) -> bool) -> bool {
        wait_for(timeout, || check(&self.frames())).await
    }
}

/// Poll `check` every 20ms until it holds or `timeout` passes
pub async fn wait_for(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn gateway(ws: WebSocketUpgrade, State(state): State<Arc<PlatformState>>) -> Response {
    ws.on_upgrade(move |socket| serve_connection(socket, state))
}

async fn serve_connection(mut socket: WebSocket, state: Arc<PlatformState>) {
    let connection = state.connections.fetch_add(1, Ordering::SeqCst);
    let behavior = state.behavior;
    let mut sequence = 0;

    if send(&mut socket, &GatewayMessage::hello(behavior.heartbeat_interval_ms))
        .await
        .is_err()
    {
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(frame) = serde_json::from_str::<GatewayMessage>(&text) else {
            continue;
        };
        let op = frame.op;
        state.frames.lock().push(ReceivedFrame { connection, frame });

        let mut replies = Vec::new();
        match op {
            OpCode::Identify => {
                sequence += 1;
                replies.push(GatewayMessage::dispatch(
                    "READY",
                    sequence,
                    json!({ "session_id": format!("session-{connection}") }),
                ));
                if behavior.invalidate_first_session && !state.invalidated.swap(true, Ordering::SeqCst) {
                    replies.push(GatewayMessage::invalid_session(false));
                }
            }
            OpCode::Resume => {
                sequence += 1;
                replies.push(GatewayMessage::dispatch("RESUMED", sequence, json!({})));
            }
            OpCode::Heartbeat if behavior.ack_heartbeats => replies.push(GatewayMessage::heartbeat_ack()),
            _ => {}
        }

        for reply in replies {
            if send(&mut socket, &reply).await.is_err() {
                return;
            }
        }
    }
}

async fn send(socket: &mut WebSocket, message: &GatewayMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).map_err(axum::Error::new)?;
    socket.send(Message::Text(text)).await
}

async fn detectable_games(State(state): State<Arc<PlatformState>>) -> Json<Value> {
    state.catalog_requests.fetch_add(1, Ordering::SeqCst);
    Json(state.games.clone())
}

/// Records the report and hands out the next rolling token
async fn activity_session(State(state): State<Arc<PlatformState>>, Json(body): Json<Value>) -> Json<Value> {
    let mut reports = state.activity_reports.lock();
    reports.push(body);
    Json(json!({ "token": format!("tok-{}", reports.len()) }))
}

/// Configuration pointing at `platform`, with `overrides` on top
pub fn test_config(platform: &MockPlatform, data_dir: &Path, overrides: &[(&str, &str)]) -> Result<AppConfig> {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("RPC_TOKEN".to_string(), TEST_TOKEN.to_string()),
        ("RPC_CUSTOM_HOST".to_string(), platform.gateway_url()),
        ("RPC_CLIENT_PROPERTIES".to_string(), "anonymous".to_string()),
        ("RPC_DATA_DIR".to_string(), data_dir.display().to_string()),
        ("RPC_POLL_INTERVAL_SECS".to_string(), "1".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert((*key).to_string(), (*value).to_string());
    }
    Ok(AppConfig::from_vars(|key| vars.get(key).cloned())?)
}

/// Reconnect timing short enough for tests
pub fn fast_timing() -> SessionTiming {
    SessionTiming {
        resume_window: Duration::from_secs(120),
        backoff_base: Duration::from_millis(100),
        backoff_ceiling: Duration::from_secs(1),
        rate_limit_delay: Duration::from_secs(1),
    }
}

/// A daemon running in the background
pub struct RunningDaemon {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<AppResult<()>>,
}

impl RunningDaemon {
    /// Start with a scripted process list, detecting as on Linux
    pub fn spawn<P: ProcessSource + 'static>(config: AppConfig, processes: P) -> Result<Self> {
        let daemon = Daemon::from_config(config)?
            .with_process_source(processes)
            .with_platform(Platform::Linux)
            .with_session_timing(fast_timing());

        let (stop, stopped) = oneshot::channel();
        let handle = tokio::spawn(daemon.run_until(async move {
            let _ = stopped.await;
        }));
        Ok(Self { stop, handle })
    }

    /// Request shutdown and wait for a clean exit
    pub async fn stop(self) -> Result<()> {
        let _ = self.stop.send(());
        tokio::time::timeout(Duration::from_secs(5), self.handle).await???;
        Ok(())
    }
}
