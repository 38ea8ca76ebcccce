mod embedder_factory;
mod local_candle_embedder;
mod openai_embedder;

pub use embedder_factory::{EmbedderFactory, EmbedderFactoryError};
pub use local_candle_embedder::{LocalCandleEmbedder, default_query_instruction};
pub use openai_embedder::{OPENAI_API_BASE, OpenAiEmbedder};
