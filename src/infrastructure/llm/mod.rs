mod embedder;
mod llm_client_factory;
mod openai_chat_client;
mod replicate_client;

pub use embedder::{
    EmbedderFactory, EmbedderFactoryError, LocalCandleEmbedder, OPENAI_API_BASE, OpenAiEmbedder,
    default_query_instruction,
};
pub use llm_client_factory::LlmClientFactory;
pub use openai_chat_client::OpenAiChatClient;
pub use replicate_client::{REPLICATE_API_BASE, ReplicateClient};
