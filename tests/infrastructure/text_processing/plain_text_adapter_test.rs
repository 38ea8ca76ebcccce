use std::path::PathBuf;

use knowbase::application::ports::{FileLoader, FileLoaderError};
use knowbase::domain::{ContentType, Document};
use knowbase::infrastructure::text_processing::PlainTextAdapter;

fn text_document(name: &str, size: u64) -> Document {
    Document::new(PathBuf::from(name), ContentType::Text, size)
}

#[tokio::test]
async fn given_utf8_text_when_extracting_then_returns_content() {
    let data = "Fjords are long, narrow inlets.".as_bytes();

    let text = PlainTextAdapter
        .extract_text(data, &text_document("fjords.txt", data.len() as u64))
        .await
        .unwrap();

    assert_eq!(text, "Fjords are long, narrow inlets.");
}

#[tokio::test]
async fn given_byte_order_mark_when_extracting_then_strips_it() {
    let data = "\u{feff}Hei verden".as_bytes();

    let text = PlainTextAdapter
        .extract_text(data, &text_document("bom.txt", data.len() as u64))
        .await
        .unwrap();

    assert_eq!(text, "Hei verden");
}

#[tokio::test]
async fn given_invalid_utf8_when_extracting_then_returns_extraction_error() {
    let data = [0xff, 0xfe, 0x00];

    let result = PlainTextAdapter
        .extract_text(&data, &text_document("binary.txt", 3))
        .await;

    assert!(matches!(result, Err(FileLoaderError::ExtractionFailed(_))));
}

#[tokio::test]
async fn given_whitespace_only_file_when_extracting_then_returns_no_text_found() {
    let result = PlainTextAdapter
        .extract_text(b"  \n\t ", &text_document("blank.txt", 5))
        .await;

    assert!(matches!(result, Err(FileLoaderError::NoTextFound(name)) if name == "blank.txt"));
}

#[tokio::test]
async fn given_pdf_document_when_extracting_then_rejects_content_type() {
    let document = Document::new(PathBuf::from("paper.pdf"), ContentType::Pdf, 4);

    let result = PlainTextAdapter.extract_text(b"%PDF", &document).await;

    assert!(matches!(result, Err(FileLoaderError::UnsupportedContentType(_))));
}
