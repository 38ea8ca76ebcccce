use std::path::PathBuf;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File};
use serde::Deserialize;

use super::Environment;
use crate::application::services::{
    DEFAULT_EMPTY_RESPONSE, DEFAULT_QA_TEMPLATE, DEFAULT_SYSTEM_PROMPT, PromptTemplate,
};

const ENV_PREFIX: &str = "APP";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub index: IndexSettings,
    pub chunking: ChunkingSettings,
    pub embeddings: EmbeddingsSettings,
    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexSettings {
    pub backend: IndexBackend,
    pub source_dir: PathBuf,
    pub persist_dir: PathBuf,
    pub recursive: bool,
    #[serde(default)]
    pub required_exts: Vec<String>,
    #[serde(default)]
    pub max_file_bytes: Option<u64>,
    /// Discard any existing index and rebuild from `source_dir` on startup.
    pub rebuild: bool,
    pub qdrant: QdrantSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Local,
    Qdrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QdrantSettings {
    pub url: String,
    pub collection_name: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingSettings {
    pub strategy: ChunkingStrategy,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embed_batch_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    Sentence,
    Fixed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub pooling: EmbeddingPooling,
    #[serde(default)]
    pub query_instruction: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Local,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingPooling {
    Cls,
    Mean,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    pub max_new_tokens: usize,
    pub temperature: f32,
    #[serde(default)]
    pub system_prompt: Option<String>,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Replicate,
    #[serde(rename = "openai")]
    OpenAi,
    LmStudio,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub max_context_tokens: usize,
    pub qa_template: String,
    pub empty_response: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub enable_json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Settings {
    /// Layers built-in defaults, `appsettings.<env>.toml` (optional) and
    /// `APP_*` environment variables, e.g. `APP_SERVER__PORT=8080`.
    pub fn load(environment: Environment) -> Result<Self, SettingsError> {
        let builder = Self::defaults(Config::builder())?
            .add_source(
                File::with_name(&format!("appsettings.{}", environment.as_str())).required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator(ENV_SEPARATOR)
                    .list_separator(",")
                    .with_list_parse_key("index.required_exts")
                    .try_parsing(true),
            );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.apply_secret_fallbacks();
        settings.validate()?;
        Ok(settings)
    }

    fn defaults(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        builder
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 5000)?
            .set_default("index.backend", "local")?
            .set_default("index.source_dir", "Source")?
            .set_default("index.persist_dir", "knowledge_base")?
            .set_default("index.recursive", false)?
            .set_default("index.required_exts", Vec::<String>::new())?
            .set_default("index.rebuild", false)?
            .set_default("index.qdrant.url", "http://localhost:6334")?
            .set_default("index.qdrant.collection_name", "knowledge_base")?
            .set_default("chunking.strategy", "sentence")?
            .set_default("chunking.chunk_size", 1024)?
            .set_default("chunking.chunk_overlap", 200)?
            .set_default("chunking.embed_batch_size", 10)?
            .set_default("embeddings.provider", "local")?
            .set_default("embeddings.model", "BAAI/bge-small-en-v1.5")?
            .set_default("embeddings.pooling", "cls")?
            .set_default("llm.provider", "replicate")?
            .set_default("llm.model", "meta/llama-2-70b-chat")?
            .set_default(
                "llm.version",
                "2796ee9483c3fd7aa2e171d38f4ca12251a30609463dcfd4cd76703f22e96cdf",
            )?
            .set_default("llm.max_new_tokens", 512)?
            .set_default("llm.temperature", 0.75)?
            .set_default("llm.system_prompt", DEFAULT_SYSTEM_PROMPT)?
            .set_default("llm.poll_interval_ms", 500)?
            .set_default("llm.timeout_secs", 180)?
            .set_default("retrieval.top_k", 2)?
            .set_default("retrieval.max_context_tokens", 3072)?
            .set_default("retrieval.qa_template", DEFAULT_QA_TEMPLATE)?
            .set_default("retrieval.empty_response", DEFAULT_EMPTY_RESPONSE)?
            .set_default("logging.level", "info")?
            .set_default("logging.enable_json", false)
    }

    fn apply_secret_fallbacks(&mut self) {
        if self.llm.api_key.is_none() {
            self.llm.api_key = match self.llm.provider {
                LlmProvider::Replicate => std::env::var("REPLICATE_API_TOKEN").ok(),
                LlmProvider::OpenAi | LlmProvider::LmStudio => std::env::var("OPENAI_API_KEY").ok(),
            };
        }
        if self.embeddings.api_key.is_none() && self.embeddings.provider == EmbeddingProvider::OpenAi
        {
            self.embeddings.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        if self.index.qdrant.api_key.is_none() {
            self.index.qdrant.api_key = std::env::var("QDRANT_API_KEY").ok();
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.chunking.chunk_size == 0 {
            return Err(SettingsError::Invalid(
                "chunking.chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(SettingsError::Invalid(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.chunking.embed_batch_size == 0 {
            return Err(SettingsError::Invalid(
                "chunking.embed_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(SettingsError::Invalid(
                "retrieval.top_k must be greater than zero".to_string(),
            ));
        }
        PromptTemplate::new(self.retrieval.qa_template.clone())
            .map_err(|e| SettingsError::Invalid(format!("retrieval.qa_template: {e}")))?;
        Ok(())
    }
}
