mod environment;
mod settings;

pub use environment::{ENVIRONMENT_VAR, Environment};
pub use settings::{
    ChunkingSettings, ChunkingStrategy, EmbeddingPooling, EmbeddingProvider, EmbeddingsSettings,
    IndexBackend, IndexSettings, LlmProvider, LlmSettings, LoggingSettings, QdrantSettings,
    RetrievalSettings, ServerSettings, Settings, SettingsError,
};
