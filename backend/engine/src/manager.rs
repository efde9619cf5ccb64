//! Engine Lifecycle Manager
//!
//! Sole owner of the llama-server process. The slot mutex is held across the
//! whole launch so concurrent `start()` calls produce one process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use visiongrab_config::SharedSettings;
use visiongrab_core::StatusSink;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::health::wait_for_ready;
use crate::process::{EngineHandle, EngineLauncher};

/// How long `stop()` waits after the polite signal before killing.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Snapshot of the managed engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineState {
    pub running: bool,
    pub port: Option<u16>,
}

struct RunningEngine {
    handle: Box<dyn EngineHandle>,
    port: u16,
}

pub struct EngineManager {
    settings: SharedSettings,
    launcher: Arc<dyn EngineLauncher>,
    status: Arc<dyn StatusSink>,
    slot: Mutex<Option<RunningEngine>>,
    grace_period: Duration,
}

impl EngineManager {
    pub fn new(
        settings: SharedSettings,
        launcher: Arc<dyn EngineLauncher>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            settings,
            launcher,
            status,
            slot: Mutex::new(None),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Launch the engine unless it is already running.
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut slot = self.slot.lock().await;

        if let Some(running) = slot.as_mut() {
            if !running.handle.has_exited() {
                info!(port = running.port, "Engine already running");
                return Ok(());
            }
            warn!(port = running.port, "Engine exited on its own; relaunching");
            *slot = None;
        }

        let config = {
            let settings = self.settings.read().await;
            EngineConfig::from_settings(&settings.local_engine)
        };
        let config = match config {
            Ok(config) => config,
            Err(e) => {
                self.status.update(&format!("Local engine: {e}"));
                return Err(e);
            }
        };

        self.status.update("Local engine: Starting...");
        self.launcher.kill_stray(&config).await;

        match self.launcher.launch(&config).await {
            Ok(handle) => {
                info!(pid = ?handle.id(), port = config.port, "Engine launched");
                *slot = Some(RunningEngine {
                    handle,
                    port: config.port,
                });
                self.status
                    .update(&format!("Local engine: Running on Port {}", config.port));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Engine launch failed");
                self.status.update(&format!("Local engine: {e}"));
                Err(e)
            }
        }
    }

    /// Start on a background task; failures only reach the log and status sink.
    pub fn spawn_start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.start().await {
                warn!(error = %e, "Background engine start failed");
            }
        })
    }

    /// Terminate the engine if it is running. Safe to call at any time.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let Some(mut running) = self.slot.lock().await.take() else {
            return Ok(());
        };

        info!(pid = ?running.handle.id(), port = running.port, "Stopping engine");
        let result = running.handle.terminate(self.grace_period).await;
        self.status.update("Local engine: Stopped");
        result
    }

    pub fn spawn_stop(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.stop().await {
                warn!(error = %e, "Background engine stop failed");
            }
        })
    }

    /// A process that exited on its own counts as not running.
    pub async fn is_running(&self) -> bool {
        self.state().await.running
    }

    pub async fn port(&self) -> Option<u16> {
        self.state().await.port
    }

    pub async fn state(&self) -> EngineState {
        let mut slot = self.slot.lock().await;
        match slot.as_mut() {
            Some(running) => {
                if running.handle.has_exited() {
                    EngineState::default()
                } else {
                    EngineState {
                        running: true,
                        port: Some(running.port),
                    }
                }
            }
            None => EngineState::default(),
        }
    }

    /// Wait for the running engine's `/health` to succeed.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), EngineError> {
        let Some(port) = self.port().await else {
            return Err(EngineError::NotConfigured(
                "engine is not running".to_string(),
            ));
        };
        wait_for_ready(port, timeout).await
    }
}
