use std::time::Duration;

use async_trait::async_trait;

/// Completion backend. `prompt` is the fully rendered question-answering prompt.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmClientError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmClientError {
    #[error("api request failed: {0}")]
    ApiRequestFailed(String),
    #[error("rate limited")]
    RateLimited,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("prediction {status}: {message}")]
    PredictionFailed { status: String, message: String },
    #[error("completion did not finish within {0:?}")]
    Timeout(Duration),
    #[error("invalid configuration: {0}")]
    Configuration(String),
}
