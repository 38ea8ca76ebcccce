use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;

use crate::application::ports::{TextSplitter, TextSplitterError};
use crate::application::services::count_tokens;
use crate::domain::{Chunk, DocumentId};

/// Packs whole sentences into chunks of at most `chunk_size` tokens, carrying
/// up to `chunk_overlap` tokens of trailing sentences into the next chunk.
/// Sentences longer than a chunk are cut at word boundaries.
pub struct SentenceSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

/// Byte span of one sentence (or sentence piece) in the source text.
#[derive(Debug, Clone, Copy)]
struct Unit {
    start: usize,
    end: usize,
    tokens: usize,
}

impl SentenceSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, TextSplitterError> {
        if chunk_size == 0 {
            return Err(TextSplitterError::SplittingFailed(
                "chunk size must be positive".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(TextSplitterError::SplittingFailed(format!(
                "chunk overlap ({chunk_overlap}) must be smaller than chunk size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    fn units(&self, text: &str) -> Vec<Unit> {
        let mut units = Vec::new();

        for (idx, sentence) in text.split_sentence_bound_indices() {
            let trimmed = sentence.trim();
            if trimmed.is_empty() {
                continue;
            }
            let start = idx + (sentence.len() - sentence.trim_start().len());
            let tokens = count_tokens(trimmed);

            if tokens <= self.chunk_size {
                units.push(Unit {
                    start,
                    end: start + trimmed.len(),
                    tokens,
                });
            } else {
                self.split_long_sentence(start, trimmed, &mut units);
            }
        }

        units
    }

    fn split_long_sentence(&self, base: usize, sentence: &str, units: &mut Vec<Unit>) {
        let mut piece: Option<Unit> = None;

        for (idx, word) in sentence.split_word_bound_indices() {
            let word_tokens = count_tokens(word);

            if let Some(current) = piece {
                if current.tokens + word_tokens > self.chunk_size {
                    units.push(current);
                    piece = None;
                }
            }

            match piece.as_mut() {
                Some(current) => {
                    if !word.trim().is_empty() {
                        current.end = base + idx + word.len();
                    }
                    current.tokens += word_tokens;
                }
                None if word.trim().is_empty() => {}
                None => {
                    piece = Some(Unit {
                        start: base + idx,
                        end: base + idx + word.len(),
                        tokens: word_tokens,
                    });
                }
            }
        }

        if let Some(current) = piece {
            units.push(current);
        }
    }

    /// Half-open ranges of unit indices, one per chunk.
    fn merge(&self, units: &[Unit]) -> Vec<(usize, usize)> {
        let mut ranges = Vec::new();
        let mut start = 0;

        while start < units.len() {
            let mut end = start;
            let mut tokens = 0;
            while end < units.len() && (end == start || tokens + units[end].tokens <= self.chunk_size)
            {
                tokens += units[end].tokens;
                end += 1;
            }
            ranges.push((start, end));

            if end == units.len() {
                break;
            }

            let mut next = end;
            let mut overlap = 0;
            while next > start + 1 && overlap + units[next - 1].tokens <= self.chunk_overlap {
                overlap += units[next - 1].tokens;
                next -= 1;
            }
            start = next;
        }

        ranges
    }
}

#[async_trait]
impl TextSplitter for SentenceSplitter {
    async fn split(
        &self,
        text: &str,
        document_id: DocumentId,
    ) -> Result<Vec<Chunk>, TextSplitterError> {
        let units = self.units(text);

        let chunks = self
            .merge(&units)
            .into_iter()
            .map(|(first, last)| {
                let start = units[first].start;
                let end = units[last - 1].end;
                let offset = text[..start].chars().count();
                Chunk::new(text[start..end].to_string(), document_id, None, offset)
            })
            .collect();

        Ok(chunks)
    }
}
