mod composite_file_loader;
mod directory_reader;
mod pdf_adapter;
mod plain_text_adapter;
mod recursive_character_splitter;
mod sentence_splitter;
mod text_sanitizer;
mod text_splitter_factory;

pub use composite_file_loader::CompositeFileLoader;
pub use directory_reader::DirectoryReader;
pub use pdf_adapter::PdfAdapter;
pub use plain_text_adapter::PlainTextAdapter;
pub use recursive_character_splitter::RecursiveCharacterSplitter;
pub use sentence_splitter::SentenceSplitter;
pub use text_sanitizer::sanitize_extracted_text;
pub use text_splitter_factory::TextSplitterFactory;
