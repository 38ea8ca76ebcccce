use std::sync::Arc;

use tokio::net::TcpListener;

use knowbase::application::services::{IndexService, PromptTemplate, RetrievalService};
use knowbase::infrastructure::llm::{EmbedderFactory, LlmClientFactory};
use knowbase::infrastructure::observability::{TracingConfig, init_tracing};
use knowbase::infrastructure::persistence::VectorStoreFactory;
use knowbase::infrastructure::text_processing::{
    CompositeFileLoader, DirectoryReader, TextSplitterFactory,
};
use knowbase::presentation::{AppState, Environment, Settings, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let environment = Environment::from_env().map_err(anyhow::Error::msg)?;
    let settings = Settings::load(environment)?;

    init_tracing(&TracingConfig::from_settings(&settings.logging, environment));
    tracing::info!(environment = %environment, "Configuration loaded");

    // Missing credentials surface before indexing starts.
    let llm_client = LlmClientFactory::create(&settings.llm)?;
    let embedder = EmbedderFactory::create(&settings.embeddings)?;
    let vector_store = VectorStoreFactory::create(&settings.index).await?;

    let text_splitter = TextSplitterFactory::create(
        settings.chunking.strategy,
        settings.chunking.chunk_size,
        settings.chunking.chunk_overlap,
    )?;
    let document_source = Arc::new(
        DirectoryReader::new(&settings.index.source_dir)
            .recursive(settings.index.recursive)
            .required_exts(&settings.index.required_exts)
            .max_file_bytes(settings.index.max_file_bytes),
    );
    let file_loader = Arc::new(CompositeFileLoader::with_default_adapters());

    let index_service = IndexService::new(
        document_source,
        file_loader,
        Arc::clone(&embedder),
        Arc::clone(&vector_store),
        text_splitter,
    )
    .with_embed_batch_size(settings.chunking.embed_batch_size);

    let status = if settings.index.rebuild {
        index_service.rebuild().await?
    } else {
        index_service.load_or_build().await?
    };
    tracing::info!(status = ?status, "Index ready");

    let retrieval_service = Arc::new(RetrievalService::new(
        embedder,
        llm_client,
        vector_store,
        settings.retrieval.top_k,
        settings.retrieval.max_context_tokens,
        PromptTemplate::new(settings.retrieval.qa_template.clone())?,
        settings.retrieval.empty_response.clone(),
    ));

    let router = create_router(AppState { retrieval_service });

    let listener = TcpListener::bind((settings.server.host.as_str(), settings.server.port)).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
