use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::Document;

/// A raw file read from the knowledge source, not yet converted to text.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub document: Document,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn load(&self) -> Result<Vec<SourceDocument>, DocumentSourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentSourceError {
    #[error("directory {0} does not exist")]
    DirectoryNotFound(PathBuf),
    #[error("no files found in {0}")]
    NoDocuments(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
