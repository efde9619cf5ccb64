use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("local engine is not configured: {0}")]
    NotConfigured(String),

    #[error("'{0}' is not a valid engine port")]
    InvalidPort(String),

    #[error("failed to launch {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine on port {port} did not become healthy within {timeout:?}")]
    StartupTimeout { port: u16, timeout: Duration },

    #[error("failed to stop engine: {0}")]
    Terminate(String),
}
