use std::sync::Arc;

use super::prompt_template::PromptTemplate;
use super::token_counter::count_tokens;
use crate::application::ports::{
    Embedder, EmbedderError, LlmClient, LlmClientError, SearchResult, VectorStore,
    VectorStoreError,
};
use crate::domain::Chunk;

pub const DEFAULT_EMPTY_RESPONSE: &str = "Empty Response";

/// The query engine: embed the question, pull the closest chunks, render
/// them into the QA prompt and hand that to the LLM.
pub struct RetrievalService<L: ?Sized, V: ?Sized>
where
    L: LlmClient,
    V: VectorStore,
{
    embedder: Arc<dyn Embedder>,
    llm_client: Arc<L>,
    vector_store: Arc<V>,
    top_k: usize,
    max_context_tokens: usize,
    qa_template: PromptTemplate,
    empty_response: String,
}

impl<L: ?Sized, V: ?Sized> RetrievalService<L, V>
where
    L: LlmClient,
    V: VectorStore,
{
    pub fn new(
        embedder: Arc<dyn Embedder>,
        llm_client: Arc<L>,
        vector_store: Arc<V>,
        top_k: usize,
        max_context_tokens: usize,
        qa_template: PromptTemplate,
        empty_response: String,
    ) -> Self {
        Self {
            embedder,
            llm_client,
            vector_store,
            top_k,
            max_context_tokens,
            qa_template,
            empty_response,
        }
    }

    pub async fn query(&self, question: &str) -> Result<QueryResponse, RetrievalError> {
        let query_embedding = self
            .embedder
            .embed(question)
            .await
            .map_err(RetrievalError::Embedding)?;

        let results = self
            .vector_store
            .search(&query_embedding, self.top_k)
            .await
            .map_err(RetrievalError::Search)?;

        if results.is_empty() {
            tracing::debug!("No chunks retrieved, skipping completion");
            return Ok(QueryResponse {
                answer: self.empty_response.clone(),
                sources: Vec::new(),
            });
        }

        let context = self.build_context(&results);
        let prompt = self.qa_template.format(&context, question);
        tracing::debug!(
            retrieved = results.len(),
            prompt_tokens = count_tokens(&prompt),
            "Prompt assembled"
        );

        let answer = self
            .llm_client
            .complete(&prompt)
            .await
            .map_err(RetrievalError::Completion)?;

        let sources = results
            .into_iter()
            .map(|r| SourceChunk {
                text: r.chunk.text,
                source: r.chunk.source,
                score: r.score,
            })
            .collect();

        Ok(QueryResponse {
            answer: answer.trim().to_string(),
            sources,
        })
    }

    /// Best-scoring chunks first until the token budget runs out. The top
    /// chunk is always kept.
    fn build_context(&self, results: &[SearchResult]) -> String {
        let mut blocks = Vec::with_capacity(results.len());
        let mut used_tokens = 0;

        for result in results {
            let block = render_chunk(&result.chunk);
            let tokens = count_tokens(&block);
            if !blocks.is_empty() && used_tokens + tokens > self.max_context_tokens {
                break;
            }
            used_tokens += tokens;
            blocks.push(block);
        }

        blocks.join("\n\n")
    }
}

fn render_chunk(chunk: &Chunk) -> String {
    match chunk.source.as_deref() {
        Some(source) => format!("file_name: {}\n\n{}", source, chunk.text),
        None => chunk.text.clone(),
    }
}

#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceChunk>,
}

#[derive(Debug, Clone)]
pub struct SourceChunk {
    pub text: String,
    pub source: Option<String>,
    pub score: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("embedding: {0}")]
    Embedding(EmbedderError),
    #[error("search: {0}")]
    Search(#[from] VectorStoreError),
    #[error("completion: {0}")]
    Completion(LlmClientError),
}
