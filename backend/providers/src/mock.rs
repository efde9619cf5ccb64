use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use visiongrab_core::{Backend, BackendError, ProcessingJob};

/// A backend that returns a canned response, optionally after a delay.
///
/// Stands in for real engines in tests and dry runs.
pub struct StaticBackend {
    name: String,
    response: Result<String, String>,
    delay: Duration,
    calls: AtomicUsize,
    last_job: Mutex<Option<ProcessingJob>>,
}

impl StaticBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: Ok("Static response".to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_job: Mutex::new(None),
        }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Ok(response.into());
        self
    }

    /// Fail every call with a network error carrying `message`.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.response = Err(message.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_job(&self) -> Option<ProcessingJob> {
        self.last_job.lock().ok().and_then(|job| job.clone())
    }
}

#[async_trait]
impl Backend for StaticBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, job: &ProcessingJob) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_job.lock() {
            *last = Some(job.clone());
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.response
            .clone()
            .map_err(|message| BackendError::network(self.name.clone(), message))
    }
}
