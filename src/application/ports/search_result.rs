use crate::domain::Chunk;

/// A stored chunk matched by a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// Higher means closer to the query, whatever the store's distance metric.
    pub score: f32,
}

impl SearchResult {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self { chunk, score }
    }

    /// File name of the document the chunk came from, when the store kept it.
    pub fn source(&self) -> Option<&str> {
        self.chunk.source.as_deref()
    }
}
