//! Runtime wiring
//!
//! Starts the gateway worker and, when enabled, the detector and the
//! presence coordinator joined by an event channel.

use std::future::Future;
use std::sync::Arc;

use rpc_common::{AppConfig, AppError, AppResult};
use rpc_core::Platform;
use rpc_detect::database::DETECTABLE_PATH;
use rpc_detect::{DetectionError, GameCatalog, GameDetector, HttpCatalogSource, ProcessSource, SysinfoProcessSource};
use rpc_gateway::session::SessionTiming;
use rpc_gateway::{rest_client, ActivitySessions, GatewayClient, GatewayClientConfig, GatewayError, GatewayHandle};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::coordinator::{GatewaySessionReporter, PresenceCoordinator};

/// Capacity of the detector -> coordinator channel
const EVENT_CHANNEL_CAPACITY: usize = 32;

type ProcessFactory<P> = Box<dyn FnOnce() -> Result<P, DetectionError> + Send>;

/// The assembled daemon
pub struct Daemon<P = SysinfoProcessSource> {
    config: AppConfig,
    gateway: GatewayClientConfig,
    processes: ProcessFactory<P>,
    platform: Option<Platform>,
}

impl Daemon<SysinfoProcessSource> {
    /// Build from configuration, enumerating processes with `sysinfo`
    pub fn from_config(config: AppConfig) -> AppResult<Self> {
        let gateway = GatewayClientConfig::from_config(&config.gateway).map_err(AppError::gateway)?;
        Ok(Self {
            config,
            gateway,
            processes: Box::new(SysinfoProcessSource::new),
            platform: Platform::current(),
        })
    }
}

impl<P: ProcessSource + 'static> Daemon<P> {
    /// Enumerate processes with `source` instead
    #[must_use]
    pub fn with_process_source<Q: ProcessSource + 'static>(self, source: Q) -> Daemon<Q> {
        Daemon {
            config: self.config,
            gateway: self.gateway,
            processes: Box::new(move || Ok(source)),
            platform: self.platform,
        }
    }

    /// Detect games as if running on `platform`
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    #[must_use]
    pub fn with_session_timing(mut self, timing: SessionTiming) -> Self {
        self.gateway = self.gateway.with_timing(timing);
        self
    }

    /// Run until Ctrl-C or a fatal gateway error
    pub async fn run(self) -> AppResult<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` completes or a fatal gateway error
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> AppResult<()> {
        let Daemon {
            config,
            gateway,
            processes,
            platform,
        } = self;

        let client = GatewayClient::new(gateway.clone());
        let handle = client.handle();
        let (stop_tx, stop_rx) = watch::channel(false);

        let detection = if config.detection.enabled {
            match start_detection(&config, &gateway, processes, platform, handle.clone(), stop_rx).await {
                Ok(tasks) => tasks,
                Err(e) => {
                    tracing::warn!(error = %e, "Game detection unavailable");
                    Vec::new()
                }
            }
        } else {
            tracing::info!("Game detection disabled");
            Vec::new()
        };

        let mut worker = tokio::spawn(client.connect());
        let joined = tokio::select! {
            joined = &mut worker => joined,
            () = shutdown => {
                tracing::info!("Shutdown requested");
                handle.shutdown();
                worker.await
            }
        };

        stop_tx.send_replace(true);
        for task in detection {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Detection task ended abnormally");
            }
        }

        match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(GatewayError::Auth(reason))) => Err(AppError::Authentication(reason)),
            Ok(Err(e)) => Err(AppError::gateway(e)),
            Err(e) => Err(AppError::internal(e)),
        }
    }
}

/// Load the catalog and spawn the detector and the coordinator
async fn start_detection<P: ProcessSource + 'static>(
    config: &AppConfig,
    gateway: &GatewayClientConfig,
    processes: ProcessFactory<P>,
    platform: Option<Platform>,
    handle: GatewayHandle,
    stop: watch::Receiver<bool>,
) -> AppResult<Vec<JoinHandle<()>>> {
    let platform = platform.ok_or_else(|| AppError::Detection(DetectionError::UnsupportedPlatform.to_string()))?;
    let source = processes().map_err(|e| AppError::Detection(e.to_string()))?;
    let detection = &config.detection;

    let catalog = Arc::new(GameCatalog::new(&detection.data_dir));
    catalog.load_cached().await;

    let http = rest_client(&config.gateway.token, gateway.properties(), config.gateway.proxy.as_ref())
        .map_err(AppError::gateway)?;
    let catalog_source = HttpCatalogSource::new(http.clone(), gateway.endpoints().api_url(DETECTABLE_PATH));
    let sessions = ActivitySessions::new(http, gateway.endpoints());

    let detector = GameDetector::new(source, Arc::clone(&catalog), platform)
        .with_policy(detection.same_tick_policy)
        .with_blacklist(detection.blacklist.clone())
        .with_poll_interval(detection.poll_interval)
        .with_refresh(Arc::new(catalog_source), detection.refresh_delay_days);
    let reporter = GatewaySessionReporter::new(sessions, handle.clone());
    let coordinator = PresenceCoordinator::new(handle, detection.blacklist.clone()).with_reporter(Arc::new(reporter));

    let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    Ok(vec![
        tokio::spawn(detector.run(events_tx, stop.clone())),
        tokio::spawn(coordinator.run(events_rx, stop)),
    ])
}

/// Resolves on Ctrl-C, or on SIGTERM on Unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
