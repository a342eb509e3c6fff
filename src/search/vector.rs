use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::Chunk;

/// A chunk with its embedding, as written to a vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// A named collection of embedded chunks supporting cosine-similarity search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Stable name of the collection this store addresses.
    fn name(&self) -> &str;

    /// Insert entries, replacing any existing entry with the same chunk id.
    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<()>;

    /// Top `limit` chunks by cosine similarity, highest first. Equal scores
    /// are ordered by chunk id.
    async fn query(&self, embedding: &[f32], limit: usize) -> Result<Vec<VectorHit>>;

    /// Drop the whole collection. Deleting a missing collection is not an error.
    async fn delete_collection(&self) -> Result<()>;

    async fn count(&self) -> Result<usize>;
}

/// In-memory vector store, optionally persisted to `{dir}/{collection}.json`.
pub struct InMemoryVectorStore {
    collection: String,
    entries: RwLock<Vec<VectorEntry>>,
    persist_path: Option<PathBuf>,
}

impl InMemoryVectorStore {
    /// A store that lives only as long as the process.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            entries: RwLock::new(Vec::new()),
            persist_path: None,
        }
    }

    pub fn open_or_create(vector_dir: &Path, collection: &str) -> Result<Self> {
        std::fs::create_dir_all(vector_dir)?;
        let persist_path = vector_dir.join(format!("{collection}.json"));

        let entries = if persist_path.exists() {
            let data = std::fs::read_to_string(&persist_path)
                .context("Failed to read vector store")?;
            serde_json::from_str(&data)
                .with_context(|| format!("Corrupt vector store at {}", persist_path.display()))?
        } else {
            Vec::new()
        };

        Ok(Self {
            collection: collection.to_string(),
            entries: RwLock::new(entries),
            persist_path: Some(persist_path),
        })
    }

    /// Write entries to disk (atomic write via temp file + rename).
    fn persist(&self, entries: &[VectorEntry]) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let data = serde_json::to_string(entries)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn upsert(&self, new_entries: Vec<VectorEntry>) -> Result<()> {
        let mut entries = self.entries.write();

        for entry in new_entries {
            match entries.iter_mut().find(|e| e.chunk.id == entry.chunk.id) {
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
        }

        self.persist(&entries)
    }

    async fn query(&self, embedding: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        let entries = self.entries.read();

        let mut scored: Vec<(f32, &VectorEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(embedding, &e.embedding), e))
            .collect();

        // Sort descending by score, then by id for a deterministic order
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.chunk.id.cmp(&b.1.chunk.id))
        });
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(score, e)| VectorHit {
                chunk: e.chunk.clone(),
                score,
            })
            .collect())
    }

    async fn delete_collection(&self) -> Result<()> {
        self.entries.write().clear();
        if let Some(path) = &self.persist_path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).context("Failed to delete vector store file"),
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().len())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
