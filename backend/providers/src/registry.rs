//! Backend Registry
//!
//! Owns one backend per [`BackendKind`] and decides which one handles a job.
//! The relay server always gets the local engine.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{info, warn};
use visiongrab_config::SharedSettings;
use visiongrab_core::{Backend, BackendError, BackendKind, ProcessingJob, ProcessingResult};
use visiongrab_engine::EngineManager;
use visiongrab_logging::{JobEvent, JobEventLogger, JobSource};

use crate::cloud::CloudBackend;
use crate::engine_client::EngineClient;
use crate::local::LocalEngineBackend;
use crate::relay_client::RelayClientBackend;
use crate::remote::RemoteEngineBackend;

/// A backend together with the kind it was registered under.
#[derive(Clone)]
pub struct SelectedBackend {
    pub kind: BackendKind,
    pub backend: Arc<dyn Backend>,
}

pub struct BackendRegistry {
    settings: SharedSettings,
    engine: Arc<EngineManager>,
    local: Arc<dyn Backend>,
    cloud: Arc<dyn Backend>,
    remote: Arc<dyn Backend>,
    relay: Arc<dyn Backend>,
}

impl BackendRegistry {
    /// Build the stock backends, sharing one HTTP connection pool.
    pub fn new(settings: SharedSettings, engine: Arc<EngineManager>) -> Self {
        let client = reqwest::Client::new();
        let engine_client = EngineClient::new(client.clone());
        Self {
            local: Arc::new(LocalEngineBackend::new(
                Arc::clone(&engine),
                settings.clone(),
                engine_client.clone(),
            )),
            cloud: Arc::new(CloudBackend::new(settings.clone(), client.clone())),
            remote: Arc::new(RemoteEngineBackend::new(settings.clone(), engine_client)),
            relay: Arc::new(RelayClientBackend::new(settings.clone(), client)),
            settings,
            engine,
        }
    }

    /// Replace the backend registered for `kind`.
    pub fn with_backend(mut self, kind: BackendKind, backend: Arc<dyn Backend>) -> Self {
        match kind {
            BackendKind::Local => self.local = backend,
            BackendKind::Cloud => self.cloud = backend,
            BackendKind::Remote => self.remote = backend,
            BackendKind::Relay => self.relay = backend,
        }
        self
    }

    pub fn get(&self, kind: BackendKind) -> SelectedBackend {
        let backend = match kind {
            BackendKind::Local => &self.local,
            BackendKind::Cloud => &self.cloud,
            BackendKind::Remote => &self.remote,
            BackendKind::Relay => &self.relay,
        };
        SelectedBackend {
            kind,
            backend: Arc::clone(backend),
        }
    }

    /// Explicit selection wins, otherwise the configured default.
    pub async fn active_backend(&self, selection: Option<BackendKind>) -> SelectedBackend {
        let default_backend = self.settings.read().await.default_backend.clone();
        self.get(resolve_kind(selection, &default_backend))
    }

    pub fn relay_backend(&self) -> SelectedBackend {
        self.get(BackendKind::Local)
    }

    pub fn engine(&self) -> &Arc<EngineManager> {
        &self.engine
    }

    /// Run a locally submitted job on the selected backend.
    ///
    /// An empty instruction is replaced with the configured prompt.
    pub async fn run_job(
        &self,
        selection: Option<BackendKind>,
        job: ProcessingJob,
    ) -> Result<ProcessingResult, BackendError> {
        let custom_prompt = self.settings.read().await.custom_prompt.clone();
        let job = job.with_default_instruction(&custom_prompt);
        let selected = self.active_backend(selection).await;
        let label = selected.kind.label();

        JobEventLogger::log_event(
            label,
            JobEvent::Submitted {
                source: JobSource::Local,
                image_bytes: job.image.len(),
            },
        );
        let started = Instant::now();

        match selected.backend.process(&job).await {
            Ok(text) => {
                JobEventLogger::log_event(
                    label,
                    JobEvent::Completed {
                        chars: text.chars().count(),
                        elapsed_ms: started.elapsed().as_millis(),
                    },
                );
                Ok(ProcessingResult::new(text, job.instruction, label))
            }
            Err(e) => {
                JobEventLogger::log_event(
                    label,
                    JobEvent::Failed {
                        error_msg: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Start the engine in the background if `localEngine.startOnStartup` is set.
    pub async fn start_default_services(&self) -> Option<JoinHandle<()>> {
        if !self.settings.read().await.local_engine.start_on_startup {
            return None;
        }
        info!("Starting local engine on startup");
        Some(self.engine.spawn_start())
    }

    /// Start the engine in the background for the relay server.
    pub fn start_relay_services(&self) -> JoinHandle<()> {
        info!("Starting local engine for relay server");
        self.engine.spawn_start()
    }

    pub async fn stop_all(&self) {
        if let Err(e) = self.engine.stop().await {
            warn!(error = %e, "Failed to stop local engine");
        }
    }
}

/// `Local`, `Remote` and `Relay` select those backends; anything else is Cloud.
pub fn resolve_kind(selection: Option<BackendKind>, default_backend: &str) -> BackendKind {
    selection.unwrap_or_else(|| BackendKind::from_setting(default_backend))
}
