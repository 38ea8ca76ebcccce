use std::sync::Arc;

use crate::application::ports::{VectorStore, VectorStoreError};
use crate::presentation::config::{IndexBackend, IndexSettings};

use super::{LocalVectorStore, QdrantAdapter};

pub struct VectorStoreFactory;

impl VectorStoreFactory {
    pub async fn create(settings: &IndexSettings) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
        match settings.backend {
            IndexBackend::Local => {
                tracing::info!(
                    persist_dir = %settings.persist_dir.display(),
                    "Using local vector store"
                );
                Ok(Arc::new(LocalVectorStore::open(&settings.persist_dir).await?))
            }
            IndexBackend::Qdrant => {
                tracing::info!(
                    url = %settings.qdrant.url,
                    collection = %settings.qdrant.collection_name,
                    "Using Qdrant vector store"
                );
                Ok(Arc::new(QdrantAdapter::new(
                    &settings.qdrant.url,
                    settings.qdrant.api_key.clone(),
                    settings.qdrant.collection_name.clone(),
                )?))
            }
        }
    }
}
