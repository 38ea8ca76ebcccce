use std::path::{Path, PathBuf};

use async_trait::async_trait;
use walkdir::{DirEntry, WalkDir};

use crate::application::ports::{DocumentSource, DocumentSourceError, SourceDocument};
use crate::domain::Document;

/// Reads every visible file of a directory as a source document.
///
/// Only the top level is read unless `recursive` is set. Entries whose name
/// starts with `.` are skipped, and so is everything below a hidden directory.
#[derive(Debug, Clone)]
pub struct DirectoryReader {
    root: PathBuf,
    recursive: bool,
    required_exts: Vec<String>,
    max_file_bytes: Option<u64>,
}

impl DirectoryReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: false,
            required_exts: Vec::new(),
            max_file_bytes: None,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Restricts reading to these extensions. Leading dots and case are ignored.
    pub fn required_exts<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.required_exts = exts
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn max_file_bytes(mut self, max_file_bytes: Option<u64>) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    fn collect_paths(&self) -> Result<Vec<(PathBuf, u64)>, DocumentSourceError> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));

        let mut paths = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                DocumentSourceError::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::other("filesystem loop while walking source directory")
                }))
            })?;

            if !entry.file_type().is_file() || !self.extension_allowed(entry.path()) {
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if let Some(limit) = self.max_file_bytes {
                if size > limit {
                    tracing::warn!(
                        path = %entry.path().display(),
                        size,
                        limit,
                        "Skipping file above size limit"
                    );
                    continue;
                }
            }

            paths.push((entry.into_path(), size));
        }

        Ok(paths)
    }

    fn extension_allowed(&self, path: &Path) -> bool {
        if self.required_exts.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .is_some_and(|e| self.required_exts.iter().any(|r| *r == e))
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

#[async_trait]
impl DocumentSource for DirectoryReader {
    #[tracing::instrument(skip(self), fields(root = %self.root.display(), recursive = self.recursive))]
    async fn load(&self) -> Result<Vec<SourceDocument>, DocumentSourceError> {
        if !tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(DocumentSourceError::DirectoryNotFound(self.root.clone()));
        }

        let reader = self.clone();
        let paths = tokio::task::spawn_blocking(move || reader.collect_paths())
            .await
            .map_err(|e| DocumentSourceError::Io(std::io::Error::other(e.to_string())))??;

        if paths.is_empty() {
            return Err(DocumentSourceError::NoDocuments(self.root.clone()));
        }

        let mut documents = Vec::with_capacity(paths.len());
        for (path, size) in paths {
            let data = tokio::fs::read(&path).await?;
            tracing::debug!(path = %path.display(), size, "Read source file");
            documents.push(SourceDocument {
                document: Document::from_path(path, size),
                data,
            });
        }

        Ok(documents)
    }
}
