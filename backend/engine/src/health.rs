//! Engine readiness probing.
//!
//! llama-server answers `GET /health` with 503 while the model loads and 200
//! once it can serve requests.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::EngineError;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// True if the engine on `127.0.0.1:<port>` reports healthy.
pub async fn health_check(port: u16) -> bool {
    let url = format!("http://127.0.0.1:{port}/health");

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(c) => c,
        Err(_) => return false,
    };

    match client.get(&url).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            debug!(port, error = %e, "Health probe failed");
            false
        }
    }
}

/// Poll `/health` until it succeeds or `timeout` passes.
pub async fn wait_for_ready(port: u16, timeout: Duration) -> Result<(), EngineError> {
    let start = Instant::now();

    loop {
        if health_check(port).await {
            info!(port, elapsed_ms = start.elapsed().as_millis() as u64, "Engine ready");
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(EngineError::StartupTimeout { port, timeout });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
