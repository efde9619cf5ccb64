use async_trait::async_trait;

use crate::error::BackendError;
use crate::types::ProcessingJob;

/// A processing engine that turns an encoded image plus an instruction into text.
///
/// Implementations must not retry on their own; retry policy belongs to the
/// caller. The only state a backend may mutate is its own connection handles.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short label used in logs and history (e.g. "Llama", "Gemini").
    fn name(&self) -> &str;

    /// Send the job and return the generated text.
    async fn process(&self, job: &ProcessingJob) -> Result<String, BackendError>;
}
