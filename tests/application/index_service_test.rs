use std::sync::Arc;

use knowbase::application::ports::{DocumentSource, Embedder, VectorStore};
use knowbase::application::services::{IndexError, IndexService, IndexStatus};
use knowbase::domain::Embedding;
use knowbase::infrastructure::persistence::{INDEX_FILE_NAME, LocalVectorStore};
use knowbase::infrastructure::text_processing::{PlainTextAdapter, RecursiveCharacterSplitter};

use crate::common::{
    FailingEmbedder, FlakyEmbedder, InMemoryDocumentSource, MissingDocumentSource, StubEmbedder,
    TEST_DIMENSIONS,
};

const WHOLE_FILE_CHUNK: usize = 1000;

fn index_service(
    source: Arc<dyn DocumentSource>,
    embedder: Arc<dyn Embedder>,
    store: Arc<LocalVectorStore>,
    chunk_size: usize,
) -> IndexService<LocalVectorStore, RecursiveCharacterSplitter> {
    IndexService::new(
        source,
        Arc::new(PlainTextAdapter),
        embedder,
        store,
        Arc::new(RecursiveCharacterSplitter::new(chunk_size, 0)),
    )
}

fn norway_source() -> Arc<InMemoryDocumentSource> {
    Arc::new(InMemoryDocumentSource::new(vec![
        ("norway.txt", b"Oslo is the capital of Norway.".as_slice()),
        ("sweden.txt", b"Stockholm is the capital of Sweden.".as_slice()),
    ]))
}

#[tokio::test]
async fn given_empty_persist_dir_when_loading_then_builds_and_persists_index() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalVectorStore::open(dir.path()).await.unwrap());
    let service = index_service(
        norway_source(),
        Arc::new(StubEmbedder::new(TEST_DIMENSIONS)),
        store.clone(),
        WHOLE_FILE_CHUNK,
    );

    let status = service.load_or_build().await.unwrap();

    assert_eq!(
        status,
        IndexStatus::Built {
            documents: 2,
            chunks: 2
        }
    );
    assert_eq!(store.len().await, 2);
    assert!(dir.path().join(INDEX_FILE_NAME).is_file());
}

#[tokio::test]
async fn given_persisted_index_when_loading_then_skips_source_directory() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = Arc::new(LocalVectorStore::open(dir.path()).await.unwrap());
        index_service(
            norway_source(),
            Arc::new(StubEmbedder::new(TEST_DIMENSIONS)),
            store,
            WHOLE_FILE_CHUNK,
        )
        .load_or_build()
        .await
        .unwrap();
    }

    let store = Arc::new(LocalVectorStore::open(dir.path()).await.unwrap());
    let embedder = Arc::new(StubEmbedder::new(TEST_DIMENSIONS));
    let service = index_service(
        Arc::new(MissingDocumentSource),
        embedder.clone(),
        store.clone(),
        WHOLE_FILE_CHUNK,
    );

    let status = service.load_or_build().await.unwrap();

    assert_eq!(
        status,
        IndexStatus::Loaded {
            vector_size: Some(TEST_DIMENSIONS as u64)
        }
    );
    assert_eq!(store.len().await, 2);
    assert!(embedder.batch_sizes().is_empty());
}

#[tokio::test]
async fn given_built_index_when_searching_then_chunks_carry_file_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalVectorStore::open(dir.path()).await.unwrap());
    index_service(
        norway_source(),
        Arc::new(StubEmbedder::new(TEST_DIMENSIONS)),
        store.clone(),
        WHOLE_FILE_CHUNK,
    )
    .load_or_build()
    .await
    .unwrap();

    let results = store
        .search(&Embedding::new(vec![0.5; TEST_DIMENSIONS]), 10)
        .await
        .unwrap();

    let mut sources: Vec<_> = results
        .iter()
        .filter_map(|r| r.chunk.source.clone())
        .collect();
    sources.sort();
    assert_eq!(sources, vec!["norway.txt", "sweden.txt"]);
}

#[tokio::test]
async fn given_unreadable_document_when_building_then_skips_it() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalVectorStore::open(dir.path()).await.unwrap());
    let source = Arc::new(InMemoryDocumentSource::new(vec![
        ("notes.txt", b"Fjords are long and narrow.".as_slice()),
        ("broken.txt", [0xffu8, 0xfe, 0xfd].as_slice()),
        ("blank.txt", b"   \n  ".as_slice()),
    ]));
    let service = index_service(
        source,
        Arc::new(StubEmbedder::new(TEST_DIMENSIONS)),
        store.clone(),
        WHOLE_FILE_CHUNK,
    );

    let status = service.load_or_build().await.unwrap();

    assert_eq!(
        status,
        IndexStatus::Built {
            documents: 1,
            chunks: 1
        }
    );
}

#[tokio::test]
async fn given_only_unreadable_documents_when_building_then_returns_empty_index_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalVectorStore::open(dir.path()).await.unwrap());
    let source = Arc::new(InMemoryDocumentSource::new(vec![(
        "broken.txt",
        [0xffu8, 0xfe, 0xfd].as_slice(),
    )]));
    let service = index_service(
        source,
        Arc::new(StubEmbedder::new(TEST_DIMENSIONS)),
        store,
        WHOLE_FILE_CHUNK,
    );

    let result = service.load_or_build().await;

    assert!(matches!(result, Err(IndexError::EmptyIndex)));
    assert!(!dir.path().join(INDEX_FILE_NAME).exists());
}

#[tokio::test]
async fn given_missing_source_directory_when_building_then_returns_source_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalVectorStore::open(dir.path()).await.unwrap());
    let service = index_service(
        Arc::new(MissingDocumentSource),
        Arc::new(StubEmbedder::new(TEST_DIMENSIONS)),
        store,
        WHOLE_FILE_CHUNK,
    );

    let result = service.load_or_build().await;

    assert!(matches!(result, Err(IndexError::Source(_))));
}

#[tokio::test]
async fn given_small_batch_size_when_building_then_embeds_in_batches() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalVectorStore::open(dir.path()).await.unwrap());
    let embedder = Arc::new(StubEmbedder::new(TEST_DIMENSIONS));
    let source = Arc::new(InMemoryDocumentSource::new(vec![(
        "long.txt",
        b"aaaaaaaaaabbbbbbbbbbccccccccccddddddddddeeeee".as_slice(),
    )]));
    let service = index_service(source, embedder.clone(), store, 10).with_embed_batch_size(2);

    let status = service.load_or_build().await.unwrap();

    assert_eq!(
        status,
        IndexStatus::Built {
            documents: 1,
            chunks: 5
        }
    );
    assert_eq!(embedder.batch_sizes(), vec![2, 2, 1]);
}

#[tokio::test]
async fn given_existing_index_when_rebuilding_then_reads_source_again() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalVectorStore::open(dir.path()).await.unwrap());
    let source = norway_source();
    let service = index_service(
        source.clone(),
        Arc::new(StubEmbedder::new(TEST_DIMENSIONS)),
        store.clone(),
        WHOLE_FILE_CHUNK,
    );
    service.load_or_build().await.unwrap();

    let status = service.rebuild().await.unwrap();

    assert!(matches!(status, IndexStatus::Built { chunks: 2, .. }));
    assert_eq!(source.loads(), 2);
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn given_failing_embedder_when_building_then_returns_embedding_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalVectorStore::open(dir.path()).await.unwrap());
    let service = IndexService::new(
        norway_source(),
        Arc::new(PlainTextAdapter),
        Arc::new(FailingEmbedder),
        store,
        Arc::new(RecursiveCharacterSplitter::new(WHOLE_FILE_CHUNK, 0)),
    );

    let result = service.load_or_build().await;

    assert!(matches!(result, Err(IndexError::Embedding(_))));
}

#[tokio::test]
async fn given_embedder_failing_midway_when_building_then_leaves_no_collection_behind() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalVectorStore::open(dir.path()).await.unwrap());
    let failed = index_service(
        norway_source(),
        Arc::new(FlakyEmbedder::new(TEST_DIMENSIONS, 1)),
        store.clone(),
        WHOLE_FILE_CHUNK,
    )
    .load_or_build()
    .await;

    assert!(matches!(failed, Err(IndexError::Embedding(_))));
    assert!(!store.collection_exists().await.unwrap());
    assert!(!dir.path().join(INDEX_FILE_NAME).exists());

    let status = index_service(
        norway_source(),
        Arc::new(StubEmbedder::new(TEST_DIMENSIONS)),
        store.clone(),
        WHOLE_FILE_CHUNK,
    )
    .load_or_build()
    .await
    .unwrap();

    assert!(matches!(status, IndexStatus::Built { documents: 2, chunks: 2 }));
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn given_index_from_other_embedding_model_when_loading_then_returns_dimension_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalVectorStore::open(dir.path()).await.unwrap());
    index_service(
        norway_source(),
        Arc::new(StubEmbedder::new(TEST_DIMENSIONS)),
        store.clone(),
        WHOLE_FILE_CHUNK,
    )
    .load_or_build()
    .await
    .unwrap();

    let result = index_service(
        Arc::new(MissingDocumentSource),
        Arc::new(StubEmbedder::new(TEST_DIMENSIONS * 2)),
        store,
        WHOLE_FILE_CHUNK,
    )
    .load_or_build()
    .await;

    match result {
        Err(error @ IndexError::DimensionMismatch { index, embedder }) => {
            assert_eq!(index, TEST_DIMENSIONS as u64);
            assert_eq!(embedder, TEST_DIMENSIONS * 2);
            assert!(error.to_string().contains("APP_INDEX__REBUILD=true"));
        }
        other => panic!("expected dimension mismatch, got {:?}", other),
    }
}
