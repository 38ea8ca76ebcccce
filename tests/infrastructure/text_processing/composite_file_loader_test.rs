use std::path::PathBuf;
use std::sync::Arc;

use knowbase::application::ports::{FileLoader, FileLoaderError};
use knowbase::domain::{ContentType, Document};
use knowbase::infrastructure::text_processing::{CompositeFileLoader, PlainTextAdapter};

#[tokio::test]
async fn given_text_document_when_extracting_then_routes_to_text_adapter() {
    let loader = CompositeFileLoader::with_default_adapters();
    let document = Document::from_path(PathBuf::from("notes.md"), 5);

    let text = loader.extract_text(b"notes", &document).await.unwrap();

    assert_eq!(text, "notes");
}

#[tokio::test]
async fn given_corrupt_pdf_when_extracting_then_returns_extraction_error() {
    let loader = CompositeFileLoader::with_default_adapters();
    let document = Document::from_path(PathBuf::from("missing/corrupt.pdf"), 12);

    let result = loader.extract_text(b"not a pdf!!!", &document).await;

    assert!(matches!(result, Err(FileLoaderError::ExtractionFailed(_))));
}

#[tokio::test]
async fn given_unregistered_content_type_when_extracting_then_returns_unsupported() {
    let loader = CompositeFileLoader::new(vec![(
        ContentType::Text,
        Arc::new(PlainTextAdapter) as Arc<dyn FileLoader>,
    )]);
    let document = Document::from_path(PathBuf::from("paper.pdf"), 4);

    let result = loader.extract_text(b"%PDF", &document).await;

    assert!(matches!(
        result,
        Err(FileLoaderError::UnsupportedContentType(mime)) if mime == "application/pdf"
    ));
}
