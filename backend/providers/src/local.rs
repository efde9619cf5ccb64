use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use visiongrab_config::SharedSettings;
use visiongrab_core::{Backend, BackendError, BackendKind, ProcessingJob};
use visiongrab_engine::EngineManager;

use crate::engine_client::EngineClient;

/// The managed llama-server on this machine.
pub struct LocalEngineBackend {
    engine: Arc<EngineManager>,
    settings: SharedSettings,
    client: EngineClient,
}

impl LocalEngineBackend {
    pub fn new(engine: Arc<EngineManager>, settings: SharedSettings, client: EngineClient) -> Self {
        Self {
            engine,
            settings,
            client,
        }
    }
}

#[async_trait]
impl Backend for LocalEngineBackend {
    fn name(&self) -> &str {
        BackendKind::Local.label()
    }

    async fn process(&self, job: &ProcessingJob) -> Result<String, BackendError> {
        let Some(port) = self.engine.port().await else {
            return Err(BackendError::EngineNotRunning);
        };
        let timeout = Duration::from_secs(self.settings.read().await.request_timeout_secs);
        self.client
            .complete(self.name(), &format!("http://127.0.0.1:{port}"), job, timeout)
            .await
    }
}
