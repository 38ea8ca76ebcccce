use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use tokio::net::TcpListener;

use knowbase::application::ports::{
    CollectionConfig, DocumentSource, DocumentSourceError, Embedder, EmbedderError, LlmClient,
    LlmClientError, SearchResult, SourceDocument, VectorStore, VectorStoreError,
};
use knowbase::domain::{Chunk, Document, DocumentId, Embedding};

pub const TEST_DIMENSIONS: usize = 4;

/// Returns the same unit vector for every text and records batch sizes.
pub struct StubEmbedder {
    dimensions: usize,
    batch_sizes: Mutex<Vec<usize>>,
}

impl StubEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    fn vector(&self) -> Embedding {
        let value = 1.0 / (self.dimensions as f32).sqrt();
        Embedding::new(vec![value; self.dimensions])
    }
}

#[async_trait::async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding, EmbedderError> {
        Ok(self.vector())
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbedderError> {
        self.batch_sizes.lock().unwrap().push(texts.len());
        Ok(texts.iter().map(|_| self.vector()).collect())
    }
}

/// Embeds normally for the first `healthy_batches` batches, then rate limits.
pub struct FlakyEmbedder {
    inner: StubEmbedder,
    healthy_batches: usize,
    calls: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new(dimensions: usize, healthy_batches: usize) -> Self {
        Self {
            inner: StubEmbedder::new(dimensions),
            healthy_batches,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbedderError> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbedderError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.healthy_batches {
            return Err(EmbedderError::RateLimited);
        }
        self.inner.embed_batch(texts).await
    }
}

pub struct FailingEmbedder;

#[async_trait::async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding, EmbedderError> {
        Err(EmbedderError::InferenceFailed("model unavailable".to_string()))
    }

    async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Embedding>, EmbedderError> {
        Err(EmbedderError::InferenceFailed("model unavailable".to_string()))
    }
}

/// Answers every prompt with a canned reply and keeps the prompts it saw.
pub struct StubLlmClient {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl StubLlmClient {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for StubLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmClientError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}

pub struct FailingLlmClient;

#[async_trait::async_trait]
impl LlmClient for FailingLlmClient {
    async fn complete(&self, _prompt: &str) -> Result<String, LlmClientError> {
        Err(LlmClientError::PredictionFailed {
            status: "failed".to_string(),
            message: "CUDA out of memory".to_string(),
        })
    }
}

/// Serves a fixed result list, truncated to the requested `top_k`.
pub struct StaticVectorStore {
    results: Vec<SearchResult>,
    searches: AtomicUsize,
}

impl StaticVectorStore {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            searches: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl VectorStore for StaticVectorStore {
    async fn create_collection(&self, _config: &CollectionConfig) -> Result<bool, VectorStoreError> {
        Ok(false)
    }

    async fn collection_exists(&self) -> Result<bool, VectorStoreError> {
        Ok(true)
    }

    async fn get_collection_vector_size(&self) -> Result<Option<u64>, VectorStoreError> {
        Ok(Some(TEST_DIMENSIONS as u64))
    }

    async fn delete_collection(&self) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn upsert(
        &self,
        _chunks: &[Chunk],
        _embeddings: &[Embedding],
    ) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn search(
        &self,
        _embedding: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.iter().take(top_k).cloned().collect())
    }
}

/// Files held in memory, keyed by file name.
pub struct InMemoryDocumentSource {
    files: Vec<(String, Vec<u8>)>,
    loads: AtomicUsize,
}

impl InMemoryDocumentSource {
    pub fn new(files: Vec<(&str, &[u8])>) -> Self {
        Self {
            files: files
                .into_iter()
                .map(|(name, data)| (name.to_string(), data.to_vec()))
                .collect(),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DocumentSource for InMemoryDocumentSource {
    async fn load(&self) -> Result<Vec<SourceDocument>, DocumentSourceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.files.is_empty() {
            return Err(DocumentSourceError::NoDocuments(PathBuf::from("memory")));
        }
        Ok(self
            .files
            .iter()
            .map(|(name, data)| SourceDocument {
                document: Document::from_path(PathBuf::from(name), data.len() as u64),
                data: data.clone(),
            })
            .collect())
    }
}

pub struct MissingDocumentSource;

#[async_trait::async_trait]
impl DocumentSource for MissingDocumentSource {
    async fn load(&self) -> Result<Vec<SourceDocument>, DocumentSourceError> {
        Err(DocumentSourceError::DirectoryNotFound(PathBuf::from("Source")))
    }
}

pub fn search_result(text: &str, source: &str, score: f32) -> SearchResult {
    SearchResult::new(
        Chunk::new(text.to_string(), DocumentId::new(), None, 0).with_source(source),
        score,
    )
}

/// Serves the router built by `build` on an ephemeral local port. `build`
/// receives the server's base URL so responses can link back to it.
pub async fn spawn_server<F>(build: F) -> String
where
    F: FnOnce(&str) -> Router,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let base_url = format!("http://{}", listener.local_addr().expect("Failed to read local addr"));
    let router = build(&base_url);
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Test server failed");
    });
    base_url
}
