//! OpenAI-compatible chat client shared by the local and remote engine backends.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use visiongrab_core::{sniff_image_mime, BackendError, ProcessingJob};

#[derive(Clone)]
pub struct EngineClient {
    client: Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl EngineClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// POST the job to `<base_url>/v1/chat/completions` and return the reply text.
    pub async fn complete(
        &self,
        backend: &str,
        base_url: &str,
        job: &ProcessingJob,
        timeout: Duration,
    ) -> Result<String, BackendError> {
        let data_url = format!("data:{};base64,{}", sniff_image_mime(&job.image), job.image);
        let body = ChatRequest {
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: &job.instruction,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            stream: false,
        };

        let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
        debug!(backend, url = %url, "Sending chat completion");

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::network(backend, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(backend, status.as_u16(), error_body));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::invalid_response(backend, e))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                BackendError::invalid_response(backend, "missing choices[0].message.content")
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::net::SocketAddr;

    /// Serve `router` on an ephemeral port and return its base URL.
    pub(crate) async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn sends_data_url_and_reads_content() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                let parts = &body["messages"][0]["content"];
                assert_eq!(parts[0]["type"], "text");
                assert_eq!(parts[0]["text"], "read it");
                let url = parts[1]["image_url"]["url"].as_str().unwrap().to_string();
                assert!(url.starts_with("data:image/png;base64,iVBOR"));
                Json(json!({"choices": [{"message": {"role": "assistant", "content": "hello"}}]}))
            }),
        );
        let base = serve(router).await;

        let client = EngineClient::new(Client::new());
        let job = ProcessingJob::new("iVBORw0KGgoAAAANSUhEUg==", "read it");
        let text = client
            .complete("Llama", &base, &job, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn missing_content_is_invalid_response() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({"choices": []})) }),
        );
        let base = serve(router).await;

        let err = EngineClient::new(Client::new())
            .complete("Remote", &base, &ProcessingJob::new("AAAA", "x"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn unreachable_engine_is_network_error() {
        let err = EngineClient::new(Client::new())
            .complete(
                "Remote",
                "http://127.0.0.1:1",
                &ProcessingJob::new("AAAA", "x"),
                Duration::from_secs(2),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Network { .. }));
    }
}
