mod index_service;
mod prompt_template;
mod retrieval_service;
mod token_counter;

pub use index_service::{DEFAULT_EMBED_BATCH_SIZE, IndexError, IndexService, IndexStatus};
pub use prompt_template::{
    DEFAULT_QA_TEMPLATE, DEFAULT_SYSTEM_PROMPT, PromptTemplate, PromptTemplateError,
};
pub use retrieval_service::{
    DEFAULT_EMPTY_RESPONSE, QueryResponse, RetrievalError, RetrievalService, SourceChunk,
};
pub use token_counter::count_tokens;
