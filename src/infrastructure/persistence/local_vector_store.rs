use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::application::ports::{
    CollectionConfig, DistanceMetric, SearchResult, VectorStore, VectorStoreError,
};
use crate::domain::{Chunk, ChunkId, Embedding};

pub const INDEX_FILE_NAME: &str = "vector_store.json";
const FORMAT_VERSION: u32 = 1;

/// Flat index held in memory and persisted as a single JSON file inside
/// `persist_dir`. Search is an exact scan, which is all a document folder
/// needs.
pub struct LocalVectorStore {
    persist_dir: PathBuf,
    state: RwLock<Option<IndexState>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexState {
    version: u32,
    dimensions: u64,
    distance_metric: DistanceMetric,
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    chunk: Chunk,
    embedding: Embedding,
}

impl LocalVectorStore {
    /// Loads `persist_dir/vector_store.json` when it exists; otherwise the
    /// store starts without a collection.
    pub async fn open(persist_dir: impl Into<PathBuf>) -> Result<Self, VectorStoreError> {
        let persist_dir = persist_dir.into();
        let index_path = persist_dir.join(INDEX_FILE_NAME);

        let state = match tokio::fs::read(&index_path).await {
            Ok(bytes) => {
                let state: IndexState = serde_json::from_slice(&bytes).map_err(|e| {
                    VectorStoreError::LoadFailed(format!("{}: {}", index_path.display(), e))
                })?;
                if state.version != FORMAT_VERSION {
                    return Err(VectorStoreError::LoadFailed(format!(
                        "{}: unsupported format version {}",
                        index_path.display(),
                        state.version
                    )));
                }
                info!(
                    path = %index_path.display(),
                    entries = state.entries.len(),
                    dimensions = state.dimensions,
                    "index_loaded"
                );
                Some(state)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(VectorStoreError::LoadFailed(format!(
                    "{}: {}",
                    index_path.display(),
                    e
                )));
            }
        };

        Ok(Self {
            persist_dir,
            state: RwLock::new(state),
        })
    }

    pub async fn len(&self) -> usize {
        self.state
            .read()
            .await
            .as_ref()
            .map(|s| s.entries.len())
            .unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn index_path(&self) -> PathBuf {
        self.persist_dir.join(INDEX_FILE_NAME)
    }
}

fn check_dimensions(expected: u64, embedding: &Embedding) -> Result<(), VectorStoreError> {
    if embedding.dimensions() as u64 != expected {
        return Err(VectorStoreError::DimensionMismatch {
            expected: expected as usize,
            actual: embedding.dimensions(),
        });
    }
    Ok(())
}

/// Higher is closer for every metric.
fn score(metric: DistanceMetric, query: &Embedding, candidate: &Embedding) -> f32 {
    match metric {
        DistanceMetric::Cosine => query.cosine_similarity(candidate),
        DistanceMetric::DotProduct => query
            .values
            .iter()
            .zip(candidate.values.iter())
            .map(|(a, b)| a * b)
            .sum(),
        DistanceMetric::Euclidean => -query
            .values
            .iter()
            .zip(candidate.values.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt(),
    }
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    #[instrument(skip(self, config), fields(persist_dir = %self.persist_dir.display()))]
    async fn create_collection(&self, config: &CollectionConfig) -> Result<bool, VectorStoreError> {
        let mut state = self.state.write().await;
        if state.is_some() {
            info!("collection already exists");
            return Ok(false);
        }

        if config.vector_dimensions == 0 {
            return Err(VectorStoreError::CollectionCreationFailed(
                "vector dimensions must be positive".to_string(),
            ));
        }

        *state = Some(IndexState {
            version: FORMAT_VERSION,
            dimensions: config.vector_dimensions,
            distance_metric: config.distance_metric,
            entries: Vec::new(),
        });

        info!(dimensions = config.vector_dimensions, "collection_created");
        Ok(true)
    }

    async fn collection_exists(&self) -> Result<bool, VectorStoreError> {
        Ok(self.state.read().await.is_some())
    }

    async fn get_collection_vector_size(&self) -> Result<Option<u64>, VectorStoreError> {
        Ok(self.state.read().await.as_ref().map(|s| s.dimensions))
    }

    #[instrument(skip(self), fields(persist_dir = %self.persist_dir.display()))]
    async fn delete_collection(&self) -> Result<(), VectorStoreError> {
        let mut state = self.state.write().await;
        *state = None;

        match tokio::fs::remove_file(self.index_path()).await {
            Ok(()) => {
                info!("collection_deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VectorStoreError::CollectionDeletionFailed(e.to_string())),
        }
    }

    #[instrument(skip(self, chunks, embeddings), fields(count = chunks.len()))]
    async fn upsert(
        &self,
        chunks: &[Chunk],
        embeddings: &[Embedding],
    ) -> Result<(), VectorStoreError> {
        if chunks.len() != embeddings.len() {
            return Err(VectorStoreError::UpsertFailed(
                "chunks and embeddings count mismatch".to_string(),
            ));
        }

        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or_else(|| {
            VectorStoreError::UpsertFailed("collection does not exist".to_string())
        })?;

        for embedding in embeddings {
            check_dimensions(state.dimensions, embedding)?;
        }

        let incoming: HashSet<ChunkId> = chunks.iter().map(|c| c.id).collect();
        state.entries.retain(|e| !incoming.contains(&e.chunk.id));
        state.entries.extend(
            chunks
                .iter()
                .cloned()
                .zip(embeddings.iter().cloned())
                .map(|(chunk, embedding)| IndexEntry { chunk, embedding }),
        );

        Ok(())
    }

    #[instrument(skip(self, embedding), fields(top_k = top_k))]
    async fn search(
        &self,
        embedding: &Embedding,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or_else(|| {
            VectorStoreError::SearchFailed("collection does not exist".to_string())
        })?;

        check_dimensions(state.dimensions, embedding)?;

        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, &IndexEntry)> = state
            .entries
            .iter()
            .map(|entry| (score(state.distance_metric, embedding, &entry.embedding), entry))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, entry)| SearchResult::new(entry.chunk.clone(), score))
            .collect())
    }

    #[instrument(skip(self), fields(persist_dir = %self.persist_dir.display()))]
    async fn persist(&self) -> Result<(), VectorStoreError> {
        let bytes = {
            let guard = self.state.read().await;
            let Some(state) = guard.as_ref() else {
                return Ok(());
            };
            serde_json::to_vec(state).map_err(|e| VectorStoreError::PersistFailed(e.to_string()))?
        };

        let dir = self.persist_dir.clone();
        let target = self.index_path();
        let size = bytes.len();
        tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &bytes))
            .await
            .map_err(|e| VectorStoreError::PersistFailed(format!("task join error: {e}")))?
            .map_err(|e| VectorStoreError::PersistFailed(e.to_string()))?;

        info!(bytes = size, "index_persisted");
        Ok(())
    }
}
