use std::sync::Arc;

use crate::application::ports::{TextSplitter, TextSplitterError};
use crate::presentation::config::ChunkingStrategy;

use super::{RecursiveCharacterSplitter, SentenceSplitter};

pub struct TextSplitterFactory;

impl TextSplitterFactory {
    /// `chunk_size` and `overlap` are tokens for `Sentence` and characters for `Fixed`.
    pub fn create(
        strategy: ChunkingStrategy,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Arc<dyn TextSplitter>, TextSplitterError> {
        match strategy {
            ChunkingStrategy::Sentence => Ok(Arc::new(SentenceSplitter::new(chunk_size, overlap)?)),
            ChunkingStrategy::Fixed => {
                Ok(Arc::new(RecursiveCharacterSplitter::new(chunk_size, overlap)))
            }
        }
    }
}
