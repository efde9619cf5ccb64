//! Google Gemini `generateContent` backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use visiongrab_config::SharedSettings;
use visiongrab_core::{sniff_image_mime, Backend, BackendError, BackendKind, ProcessingJob};

pub struct CloudBackend {
    settings: SharedSettings,
    client: Client,
}

impl CloudBackend {
    pub fn new(settings: SharedSettings, client: Client) -> Self {
        Self { settings, client }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    Image { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'static str,
    data: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[async_trait]
impl Backend for CloudBackend {
    fn name(&self) -> &str {
        BackendKind::Cloud.label()
    }

    async fn process(&self, job: &ProcessingJob) -> Result<String, BackendError> {
        let (api_key, model_id, base_url, timeout) = {
            let settings = self.settings.read().await;
            (
                settings.cloud.api_key.clone(),
                settings.cloud.model_id.clone(),
                settings.cloud.base_url.clone(),
                Duration::from_secs(settings.request_timeout_secs),
            )
        };
        if api_key.trim().is_empty() {
            return Err(BackendError::NotConfigured("Gemini API key".to_string()));
        }

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: &job.instruction,
                    },
                    Part::Image {
                        inline_data: InlineData {
                            mime_type: sniff_image_mime(&job.image),
                            data: &job.image,
                        },
                    },
                ],
            }],
        };

        let url = format!(
            "{}/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            model_id
        );
        debug!(model = %model_id, "Sending request to Gemini");

        // Header rather than `?key=` so the key never appears in URLs or error text.
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::network(self.name(), e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(self.name(), status.as_u16(), error_body));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::invalid_response(self.name(), e))?;

        if parsed.candidates.is_empty() {
            if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
                return Err(BackendError::invalid_response(
                    self.name(),
                    format!("request blocked: {reason}"),
                ));
            }
        }

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| {
                BackendError::invalid_response(
                    self.name(),
                    "missing candidates[0].content.parts[0].text",
                )
            })
    }
}
