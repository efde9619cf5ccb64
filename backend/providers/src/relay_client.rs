use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use visiongrab_config::SharedSettings;
use visiongrab_core::{Backend, BackendError, BackendKind, ProcessingJob};

/// Sends jobs to a peer's relay server at `relay.clientAddress`.
pub struct RelayClientBackend {
    settings: SharedSettings,
    client: Client,
}

impl RelayClientBackend {
    pub fn new(settings: SharedSettings, client: Client) -> Self {
        Self { settings, client }
    }
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    image: &'a str,
    prompt: &'a str,
}

#[async_trait]
impl Backend for RelayClientBackend {
    fn name(&self) -> &str {
        BackendKind::Relay.label()
    }

    async fn process(&self, job: &ProcessingJob) -> Result<String, BackendError> {
        let (address, timeout) = {
            let settings = self.settings.read().await;
            (
                settings.relay.client_address.clone(),
                Duration::from_secs(settings.request_timeout_secs),
            )
        };
        if address.trim().is_empty() {
            return Err(BackendError::NotConfigured("relay client address".to_string()));
        }

        let response = self
            .client
            .post(format!("{}/process", address.trim_end_matches('/')))
            .timeout(timeout)
            .json(&RelayRequest {
                image: &job.image,
                prompt: &job.instruction,
            })
            .send()
            .await
            .map_err(|e| BackendError::network(self.name(), e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::invalid_response(self.name(), e))?;
        if !status.is_success() {
            return Err(BackendError::from_status(self.name(), status.as_u16(), body));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_client::tests::serve;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::Value;
    use visiongrab_config::{shared, AppSettings};

    fn backend_for(address: String) -> RelayClientBackend {
        let mut settings = AppSettings::default();
        settings.relay.client_address = address;
        RelayClientBackend::new(shared(settings), Client::new())
    }

    #[tokio::test]
    async fn returns_raw_body() {
        let router = Router::new().route(
            "/process",
            post(|Json(body): Json<Value>| async move {
                format!("{} via peer", body["prompt"].as_str().unwrap_or_default())
            }),
        );
        let backend = backend_for(serve(router).await);
        let text = backend.process(&ProcessingJob::new("AAAA", "hi")).await.unwrap();
        assert_eq!(text, "hi via peer");
    }

    #[tokio::test]
    async fn server_error_keeps_peer_message() {
        let router = Router::new().route(
            "/process",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "Server Error: local engine is not running") }),
        );
        let backend = backend_for(serve(router).await);
        let err = backend.process(&ProcessingJob::new("AAAA", "hi")).await.unwrap_err();
        assert!(err.to_string().contains("local engine is not running"));
    }
}
