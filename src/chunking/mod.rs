//! Index-time text preparation: whitespace cleaning and sentence-aware
//! splitting of documents into overlapping chunks.

pub mod sentence;

use crate::models::{Chunk, Document};

/// Collapse every whitespace run to a single space and trim the ends.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits documents into word-bounded windows that break on sentence ends.
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SentenceChunker {
    /// `chunk_size` and `chunk_overlap` are word counts. The overlap is
    /// clamped below the size so every window makes progress.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Split a document. Every chunk inherits the document's metadata
    /// unchanged; an empty document yields no chunks.
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        sentence::split_text(&document.content, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                id: format!("{}-{i}", document.id),
                document_id: document.id.clone(),
                text,
                metadata: document.metadata.clone(),
            })
            .collect()
    }
}
