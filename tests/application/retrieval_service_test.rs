use std::sync::Arc;

use knowbase::application::ports::{Embedder, LlmClient};
use knowbase::application::services::{
    DEFAULT_EMPTY_RESPONSE, PromptTemplate, RetrievalError, RetrievalService,
};

use crate::common::{
    FailingEmbedder, FailingLlmClient, StaticVectorStore, StubEmbedder, StubLlmClient,
    TEST_DIMENSIONS, search_result,
};

const TEST_TOP_K: usize = 2;
const TEST_MAX_CONTEXT_TOKENS: usize = 3072;

fn service<L: LlmClient>(
    embedder: Arc<dyn Embedder>,
    llm: Arc<L>,
    store: Arc<StaticVectorStore>,
    max_context_tokens: usize,
) -> RetrievalService<L, StaticVectorStore> {
    RetrievalService::new(
        embedder,
        llm,
        store,
        TEST_TOP_K,
        max_context_tokens,
        PromptTemplate::default(),
        DEFAULT_EMPTY_RESPONSE.to_string(),
    )
}

fn three_results() -> Arc<StaticVectorStore> {
    Arc::new(StaticVectorStore::new(vec![
        search_result("Bergen is rainy.", "weather.txt", 0.9),
        search_result("Tromso has polar nights.", "weather.txt", 0.8),
        search_result("Stavanger has oil.", "economy.txt", 0.4),
    ]))
}

#[tokio::test]
async fn given_matching_chunks_when_querying_then_returns_trimmed_answer_and_sources() {
    let llm = Arc::new(StubLlmClient::new("\n It rains a lot. \n"));
    let service = service(
        Arc::new(StubEmbedder::new(TEST_DIMENSIONS)),
        llm.clone(),
        three_results(),
        TEST_MAX_CONTEXT_TOKENS,
    );

    let response = service.query("How is the weather in Bergen?").await.unwrap();

    assert_eq!(response.answer, "It rains a lot.");
    assert_eq!(response.sources.len(), TEST_TOP_K);
    assert_eq!(response.sources[0].text, "Bergen is rainy.");
    assert_eq!(response.sources[0].source.as_deref(), Some("weather.txt"));
    assert!(response.sources[0].score >= response.sources[1].score);
}

#[tokio::test]
async fn given_matching_chunks_when_querying_then_context_lists_chunks_in_score_order() {
    let llm = Arc::new(StubLlmClient::new("answer"));
    let service = service(
        Arc::new(StubEmbedder::new(TEST_DIMENSIONS)),
        llm.clone(),
        three_results(),
        TEST_MAX_CONTEXT_TOKENS,
    );

    service.query("Weather?").await.unwrap();

    let prompt = &llm.prompts()[0];
    let first = prompt.find("Bergen is rainy.").unwrap();
    let second = prompt.find("Tromso has polar nights.").unwrap();
    assert!(first < second);
    assert!(prompt.contains("file_name: weather.txt\n\nBergen is rainy.\n\nfile_name: weather.txt"));
    assert!(!prompt.contains("Stavanger"));
}

#[tokio::test]
async fn given_tiny_token_budget_when_querying_then_keeps_only_top_chunk() {
    let llm = Arc::new(StubLlmClient::new("answer"));
    let service = service(
        Arc::new(StubEmbedder::new(TEST_DIMENSIONS)),
        llm.clone(),
        three_results(),
        1,
    );

    let response = service.query("Weather?").await.unwrap();

    let prompt = &llm.prompts()[0];
    assert!(prompt.contains("Bergen is rainy."));
    assert!(!prompt.contains("Tromso"));
    assert_eq!(response.sources.len(), TEST_TOP_K);
}

#[tokio::test]
async fn given_no_results_when_querying_then_returns_empty_response() {
    let llm = Arc::new(StubLlmClient::new("unused"));
    let service = service(
        Arc::new(StubEmbedder::new(TEST_DIMENSIONS)),
        llm.clone(),
        Arc::new(StaticVectorStore::empty()),
        TEST_MAX_CONTEXT_TOKENS,
    );

    let response = service.query("Weather?").await.unwrap();

    assert_eq!(response.answer, DEFAULT_EMPTY_RESPONSE);
    assert!(response.sources.is_empty());
    assert!(llm.prompts().is_empty());
}

#[tokio::test]
async fn given_failing_embedder_when_querying_then_returns_embedding_error() {
    let store = three_results();
    let service = service(
        Arc::new(FailingEmbedder),
        Arc::new(StubLlmClient::new("unused")),
        store.clone(),
        TEST_MAX_CONTEXT_TOKENS,
    );

    let result = service.query("Weather?").await;

    assert!(matches!(result, Err(RetrievalError::Embedding(_))));
    assert_eq!(store.searches(), 0);
}

#[tokio::test]
async fn given_failing_llm_when_querying_then_returns_completion_error() {
    let service = service(
        Arc::new(StubEmbedder::new(TEST_DIMENSIONS)),
        Arc::new(FailingLlmClient),
        three_results(),
        TEST_MAX_CONTEXT_TOKENS,
    );

    let result = service.query("Weather?").await;

    assert!(matches!(result, Err(RetrievalError::Completion(_))));
}
