use async_trait::async_trait;

use crate::domain::Embedding;

const DIMENSIONS_SAMPLE_TEXT: &str = "dimension check";

/// Turns text into vectors. Queries and indexed chunks must come from the
/// same model, since their vectors are only comparable within one space.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a search query. Models with a retrieval instruction prepend it here.
    async fn embed(&self, text: &str) -> Result<Embedding, EmbedderError>;

    /// Embeds chunk texts for indexing, one vector per text in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbedderError>;

    /// Length of the vectors this embedder produces.
    async fn dimensions(&self) -> Result<usize, EmbedderError> {
        Ok(self.embed(DIMENSIONS_SAMPLE_TEXT).await?.dimensions())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbedderError {
    #[error("embedding api request failed: {0}")]
    ApiRequestFailed(String),
    #[error("embedding rate limited")]
    RateLimited,
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("model loading failed: {0}")]
    ModelLoadFailed(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}
