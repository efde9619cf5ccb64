use thiserror::Error;

/// Failure of a single [`crate::Backend::process`] call.
///
/// The `Display` text is what ends up in front of the user (status line or
/// relay `500` body), so every variant carries a readable cause.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("network error talking to {backend}: {message}")]
    Network { backend: String, message: String },

    #[error("{backend} returned {status}: {body}")]
    Status {
        backend: String,
        status: u16,
        body: String,
    },

    #[error("authentication failed for {backend}: {message}")]
    Auth { backend: String, message: String },

    #[error("local engine is not running")]
    EngineNotRunning,

    #[error("unexpected response from {backend}: {message}")]
    InvalidResponse { backend: String, message: String },

    #[error("{0} is not configured")]
    NotConfigured(String),
}

impl BackendError {
    pub fn network(backend: impl Into<String>, message: impl ToString) -> Self {
        Self::Network {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_response(backend: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidResponse {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    /// Map a non-success HTTP status to the matching variant.
    /// 401/403 are treated as credential problems.
    pub fn from_status(backend: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        let backend = backend.into();
        let body = body.into();
        if status == 401 || status == 403 {
            Self::Auth {
                backend,
                message: format!("HTTP {status}: {body}"),
            }
        } else {
            Self::Status {
                backend,
                status,
                body,
            }
        }
    }
}
