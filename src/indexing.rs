//! Index build: load crawled posts, split them into chunks, embed the
//! chunks and write them to the vector store.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::chunking::SentenceChunker;
use crate::llm::Embedder;
use crate::models::{Chunk, Document, DocumentRecord};
use crate::search::vector::{VectorEntry, VectorStore};

/// On-disk layout of the crawled posts. Both carry the columns `source`,
/// `title`, `url`, `date` and `content`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Comma-separated with a header row, as written by the crawler
    Csv,
    /// One JSON object per line
    JsonLines,
}

impl DocumentFormat {
    /// `.jsonl`, `.ndjson` and `.json` files are JSON Lines; anything else
    /// is read as CSV.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("jsonl" | "ndjson" | "json") => Self::JsonLines,
            _ => Self::Csv,
        }
    }
}

/// Read crawled records from `path`, picking the format from its extension.
/// Records whose cleaned content is empty are skipped with a warning.
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents from {}", path.display()))?;
    match DocumentFormat::from_path(path) {
        DocumentFormat::Csv => parse_csv_documents(&data),
        DocumentFormat::JsonLines => parse_documents(&data),
    }
}

/// Parse JSON Lines records. Blank lines are ignored.
pub fn parse_documents(data: &str) -> Result<Vec<Document>> {
    let mut documents = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: DocumentRecord = serde_json::from_str(line)
            .with_context(|| format!("Invalid document record on line {}", line_no + 1))?;
        push_document(&mut documents, record, line_no);
    }

    Ok(documents)
}

/// Parse CSV records with a header row. Quoted fields may span lines.
pub fn parse_csv_documents(data: &str) -> Result<Vec<Document>> {
    let mut reader = csv::Reader::from_reader(data.as_bytes());
    let mut documents = Vec::new();

    for (row, record) in reader.deserialize::<DocumentRecord>().enumerate() {
        let record =
            record.with_context(|| format!("Invalid document record in row {}", row + 1))?;
        push_document(&mut documents, record, row);
    }

    Ok(documents)
}

fn push_document(documents: &mut Vec<Document>, record: DocumentRecord, ordinal: usize) {
    let document = Document::from_record(record, ordinal);
    if document.content.is_empty() {
        tracing::warn!("Skipping {} (empty content)", document.id);
        return;
    }
    documents.push(document);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexReport {
    pub documents: usize,
    pub chunks: usize,
    /// Points in the collection after the build
    pub points: usize,
}

pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunker: SentenceChunker,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        chunker: SentenceChunker,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            chunker,
            batch_size: batch_size.max(1),
        }
    }

    /// Recreate the collection from `documents`.
    pub async fn build(&self, documents: &[Document]) -> Result<IndexReport> {
        self.store
            .delete_collection()
            .await
            .with_context(|| format!("Failed to reset collection {}", self.store.name()))?;

        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| self.chunker.chunk(doc))
            .collect();
        tracing::info!(
            "Split {} documents into {} chunks",
            documents.len(),
            chunks.len()
        );

        let total_batches = chunks.len().div_ceil(self.batch_size);
        for (i, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self
                .embedder
                .embed(&texts)
                .await
                .with_context(|| format!("Failed to embed batch {}/{total_batches}", i + 1))?;

            let entries = batch
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(chunk, embedding)| VectorEntry { chunk, embedding })
                .collect();
            self.store.upsert(entries).await?;
            tracing::debug!("Indexed batch {}/{total_batches}", i + 1);
        }

        let points = self.store.count().await?;
        tracing::info!(
            "Collection '{}' now holds {points} points",
            self.store.name()
        );

        Ok(IndexReport {
            documents: documents.len(),
            chunks: chunks.len(),
            points,
        })
    }
}
