//! Relay HTTP routes.
//!
//! | Method | Path       | Response                               |
//! |--------|------------|----------------------------------------|
//! | GET    | any        | 200 `Relay Server is Active`           |
//! | POST   | `/process` | 200 result text, 400 bad body, 500 error |
//! | other  | other      | 404                                    |

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{ConnectInfo, DefaultBodyLimit, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{info, warn};
use visiongrab_config::SharedSettings;
use visiongrab_core::{ProcessingJob, ProcessingResult, ResultSink, StatusSink};
use visiongrab_logging::{JobEvent, JobEventLogger, JobSource};
use visiongrab_providers::BackendRegistry;

pub const LIVENESS_BODY: &str = "Relay Server is Active";

/// Label recorded with results that arrived through the relay.
pub const RELAY_RESULT_LABEL: &str = "Relay Server";

/// Screenshots are sent base64-encoded in one JSON body.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct RelayState {
    pub registry: Arc<BackendRegistry>,
    pub settings: SharedSettings,
    pub results: Arc<dyn ResultSink>,
    pub status: Arc<dyn StatusSink>,
}

#[derive(Debug, Deserialize)]
struct RelayRequest {
    image: Option<String>,
    prompt: Option<String>,
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route(
            "/process",
            get(liveness).post(process).fallback(not_found),
        )
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

async fn liveness() -> &'static str {
    LIVENESS_BODY
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn fallback(method: Method) -> Response {
    if method == Method::GET || method == Method::HEAD {
        LIVENESS_BODY.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

fn bad_request(reason: &str) -> Response {
    (StatusCode::BAD_REQUEST, reason.to_string()).into_response()
}

/// `POST /process`: run the job on the local engine and return its text.
async fn process(
    State(state): State<RelayState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Response {
    state
        .status
        .update(&format!("Relay Server: Processing request from {peer}"));

    if body.iter().all(u8::is_ascii_whitespace) {
        return bad_request("Empty request body");
    }
    let request: RelayRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return bad_request(&format!("Invalid JSON: {e}")),
    };
    let Some(image) = request.image.filter(|image| !image.is_empty()) else {
        return bad_request("Missing image");
    };
    let prompt = request.prompt.unwrap_or_default();

    let selected = state.registry.relay_backend();
    let label = selected.kind.label();
    info!(peer = %peer, backend = label, "Relay request");
    JobEventLogger::log_event(
        label,
        JobEvent::Submitted {
            source: JobSource::Relay,
            image_bytes: image.len(),
        },
    );

    let started = Instant::now();
    let job = ProcessingJob::new(image, prompt);
    match selected.backend.process(&job).await {
        Ok(text) => {
            JobEventLogger::log_event(
                label,
                JobEvent::Completed {
                    chars: text.chars().count(),
                    elapsed_ms: started.elapsed().as_millis(),
                },
            );
            if state.settings.read().await.relay.display_results {
                state.results.deliver(&ProcessingResult::new(
                    text.clone(),
                    job.instruction,
                    RELAY_RESULT_LABEL,
                ));
            }
            (StatusCode::OK, text).into_response()
        }
        Err(e) => {
            warn!(peer = %peer, error = %e, "Relay request failed");
            JobEventLogger::log_event(
                label,
                JobEvent::Failed {
                    error_msg: e.to_string(),
                },
            );
            server_error(&e.to_string())
        }
    }
}

fn server_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Server Error: {message}"),
    )
        .into_response()
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    warn!(message = %message, "Relay handler panicked");
    server_error(&message)
}
