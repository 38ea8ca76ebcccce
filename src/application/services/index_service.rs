use std::sync::Arc;

use tracing::Instrument;

use crate::application::ports::{
    CollectionConfig, DocumentSource, DocumentSourceError, Embedder, EmbedderError, FileLoader,
    SourceDocument, TextSplitter, TextSplitterError, VectorStore, VectorStoreError,
};
use crate::domain::{Chunk, Embedding};

pub const DEFAULT_EMBED_BATCH_SIZE: usize = 10;

/// Owns the index lifecycle: reuse what the vector store already holds, or
/// build it from the source directory.
pub struct IndexService<V: ?Sized, T: ?Sized>
where
    V: VectorStore,
    T: TextSplitter,
{
    document_source: Arc<dyn DocumentSource>,
    file_loader: Arc<dyn FileLoader>,
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<V>,
    text_splitter: Arc<T>,
    embed_batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexStatus {
    Loaded { vector_size: Option<u64> },
    Built { documents: usize, chunks: usize },
}

impl<V: ?Sized, T: ?Sized> IndexService<V, T>
where
    V: VectorStore,
    T: TextSplitter,
{
    pub fn new(
        document_source: Arc<dyn DocumentSource>,
        file_loader: Arc<dyn FileLoader>,
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<V>,
        text_splitter: Arc<T>,
    ) -> Self {
        Self {
            document_source,
            file_loader,
            embedder,
            vector_store,
            text_splitter,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }

    pub fn with_embed_batch_size(mut self, embed_batch_size: usize) -> Self {
        self.embed_batch_size = embed_batch_size.max(1);
        self
    }

    #[tracing::instrument(skip(self))]
    pub async fn load_or_build(&self) -> Result<IndexStatus, IndexError> {
        if self.vector_store.collection_exists().await? {
            let vector_size = self.vector_store.get_collection_vector_size().await?;
            if let Some(index_dimensions) = vector_size {
                self.check_embedder_dimensions(index_dimensions).await?;
            }
            tracing::info!(vector_size = ?vector_size, "Reusing persisted index");
            return Ok(IndexStatus::Loaded { vector_size });
        }

        tracing::info!("No persisted index found, building from source documents");
        self.build().await
    }

    #[tracing::instrument(skip(self))]
    pub async fn rebuild(&self) -> Result<IndexStatus, IndexError> {
        self.vector_store.delete_collection().await?;
        self.build().await
    }

    /// An index built with another embedding model cannot answer queries.
    async fn check_embedder_dimensions(&self, index_dimensions: u64) -> Result<(), IndexError> {
        let embedder_dimensions = self.embedder.dimensions().await?;
        if embedder_dimensions as u64 != index_dimensions {
            return Err(IndexError::DimensionMismatch {
                index: index_dimensions,
                embedder: embedder_dimensions,
            });
        }
        Ok(())
    }

    /// A failed build drops whatever it already wrote, so the next start
    /// never mistakes a partial collection for a complete index.
    async fn build(&self) -> Result<IndexStatus, IndexError> {
        let mut collection_ready = false;
        let result = self.index_sources(&mut collection_ready).await;

        if result.is_err() && collection_ready {
            tracing::warn!("Index build failed, discarding partial collection");
            if let Err(e) = self.vector_store.delete_collection().await {
                tracing::error!(error = %e, "Failed to discard partial collection");
            }
        }

        result
    }

    async fn index_sources(&self, collection_ready: &mut bool) -> Result<IndexStatus, IndexError> {
        let sources = self.document_source.load().await?;
        tracing::info!(files = sources.len(), "Indexing source documents");

        let mut documents = 0;
        let mut total_chunks = 0;

        for source in sources {
            let span = tracing::info_span!(
                "index_document",
                document_id = %source.document.id.as_uuid(),
                filename = %source.document.filename,
            );

            let indexed = self
                .index_document(&source, collection_ready)
                .instrument(span)
                .await?;

            if indexed > 0 {
                documents += 1;
                total_chunks += indexed;
            }
        }

        if total_chunks == 0 {
            return Err(IndexError::EmptyIndex);
        }

        self.vector_store.persist().await?;
        tracing::info!(documents, chunks = total_chunks, "Index built");

        Ok(IndexStatus::Built {
            documents,
            chunks: total_chunks,
        })
    }

    /// Returns the number of chunks written; zero when the file was skipped.
    async fn index_document(
        &self,
        source: &SourceDocument,
        collection_ready: &mut bool,
    ) -> Result<usize, IndexError> {
        let Some(chunks) = self.prepare_chunks(source).await? else {
            return Ok(0);
        };

        let embeddings = self.embed_chunks(&chunks).await?;

        if !*collection_ready {
            let dimensions = embeddings.first().map(Embedding::dimensions).unwrap_or(0);
            self.vector_store
                .create_collection(&CollectionConfig::new(dimensions as u64))
                .await?;
            *collection_ready = true;
        }

        self.vector_store.upsert(&chunks, &embeddings).await?;
        tracing::debug!(chunks = chunks.len(), "Document indexed");

        Ok(chunks.len())
    }

    /// `None` means the file was skipped: unreadable or produced no chunks.
    async fn prepare_chunks(
        &self,
        source: &SourceDocument,
    ) -> Result<Option<Vec<Chunk>>, IndexError> {
        let document = &source.document;

        let text = match self.file_loader.extract_text(&source.data, document).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable document");
                return Ok(None);
            }
        };

        let chunks: Vec<Chunk> = self
            .text_splitter
            .split(&text, document.id)
            .await?
            .into_iter()
            .filter(|c| !c.text.trim().is_empty())
            .map(|c| c.with_source(document.filename.clone()))
            .collect();

        if chunks.is_empty() {
            tracing::debug!("Document produced no chunks");
            return Ok(None);
        }

        Ok(Some(chunks))
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Embedding>, IndexError> {
        let mut embeddings = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.embed_batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let batch_embeddings = self.embedder.embed_batch(&texts).await?;

            if batch_embeddings.len() != batch.len() {
                return Err(IndexError::Embedding(EmbedderError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    batch_embeddings.len()
                ))));
            }
            embeddings.extend(batch_embeddings);
        }

        Ok(embeddings)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("document source: {0}")]
    Source(#[from] DocumentSourceError),
    #[error("text splitting: {0}")]
    Splitting(#[from] TextSplitterError),
    #[error("embedding: {0}")]
    Embedding(#[from] EmbedderError),
    #[error("storage: {0}")]
    Storage(#[from] VectorStoreError),
    #[error("no document produced any indexable text")]
    EmptyIndex,
    #[error(
        "persisted index has {index}-dimensional vectors but the embedder produces {embedder}; \
         rebuild it with APP_INDEX__REBUILD=true"
    )]
    DimensionMismatch { index: u64, embedder: usize },
}
