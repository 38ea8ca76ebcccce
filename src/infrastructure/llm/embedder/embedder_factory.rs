use std::sync::Arc;

use crate::application::ports::Embedder;
use crate::presentation::config::{EmbeddingProvider, EmbeddingsSettings};

use super::{LocalCandleEmbedder, OpenAiEmbedder};

pub struct EmbedderFactory;

#[derive(Debug, thiserror::Error)]
pub enum EmbedderFactoryError {
    #[error("missing API key: OpenAI embedder requires OPENAI_API_KEY")]
    MissingApiKey,
    #[error("model initialization failed: {0}")]
    InitializationFailed(String),
}

impl EmbedderFactory {
    pub fn create(settings: &EmbeddingsSettings) -> Result<Arc<dyn Embedder>, EmbedderFactoryError> {
        let model = settings.model.clone();

        match settings.provider {
            EmbeddingProvider::Local => {
                tracing::info!(model = %model, "Loading local Candle embedding model");
                let mut embedder = LocalCandleEmbedder::new(&model, settings.pooling)
                    .map_err(|e| EmbedderFactoryError::InitializationFailed(e.to_string()))?;
                if settings.query_instruction.is_some() {
                    embedder = embedder.with_query_instruction(settings.query_instruction.clone());
                }
                Ok(Arc::new(embedder))
            }
            EmbeddingProvider::OpenAi => {
                let key = settings
                    .api_key
                    .clone()
                    .filter(|k| !k.is_empty())
                    .ok_or(EmbedderFactoryError::MissingApiKey)?;
                tracing::info!(model = %model, "Using OpenAI embedding model");
                let embedder = match &settings.base_url {
                    Some(base_url) => OpenAiEmbedder::with_base_url(base_url.clone(), key, model),
                    None => OpenAiEmbedder::new(key, model),
                };
                Ok(Arc::new(embedder))
            }
        }
    }
}
