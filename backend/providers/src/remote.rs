use std::time::Duration;

use async_trait::async_trait;
use visiongrab_config::SharedSettings;
use visiongrab_core::{Backend, BackendError, BackendKind, ProcessingJob};

use crate::engine_client::EngineClient;

/// A llama-server on another machine, at `remoteEngine.address`.
pub struct RemoteEngineBackend {
    settings: SharedSettings,
    client: EngineClient,
}

impl RemoteEngineBackend {
    pub fn new(settings: SharedSettings, client: EngineClient) -> Self {
        Self { settings, client }
    }
}

#[async_trait]
impl Backend for RemoteEngineBackend {
    fn name(&self) -> &str {
        BackendKind::Remote.label()
    }

    async fn process(&self, job: &ProcessingJob) -> Result<String, BackendError> {
        let (address, timeout) = {
            let settings = self.settings.read().await;
            (
                settings.remote_engine.address.clone(),
                Duration::from_secs(settings.request_timeout_secs),
            )
        };
        if address.trim().is_empty() {
            return Err(BackendError::NotConfigured("remote engine address".to_string()));
        }
        self.client.complete(self.name(), &address, job, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_client::tests::serve;
    use axum::{routing::post, Json, Router};
    use serde_json::json;
    use visiongrab_config::{shared, AppSettings};

    #[tokio::test]
    async fn uses_address_from_settings_at_call_time() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"choices": [{"message": {"content": "remote text"}}]})) }),
        );
        let base = serve(router).await;

        let settings = shared(AppSettings::default());
        let backend = RemoteEngineBackend::new(settings.clone(), EngineClient::new(reqwest::Client::new()));

        settings.write().await.remote_engine.address = base;
        let text = backend.process(&ProcessingJob::new("AAAA", "go")).await.unwrap();
        assert_eq!(text, "remote text");
    }

    #[tokio::test]
    async fn empty_address_is_not_configured() {
        let mut settings = AppSettings::default();
        settings.remote_engine.address.clear();
        let backend = RemoteEngineBackend::new(shared(settings), EngineClient::new(reqwest::Client::new()));
        let err = backend.process(&ProcessingJob::new("AAAA", "go")).await.unwrap_err();
        assert!(matches!(err, BackendError::NotConfigured(_)));
    }
}
