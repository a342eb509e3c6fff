//! Qdrant backend for [`VectorStore`], over gRPC with `qdrant-client`.
//!
//! Qdrant point ids must be UUIDs or integers, so each chunk id is mapped to
//! a name-based UUID and the chunk itself travels in the point payload.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::models::{Chunk, ChunkMetadata};
use crate::search::vector::{VectorEntry, VectorHit, VectorStore};

/// A [`VectorStore`] bound to one Qdrant collection with cosine distance.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
}

impl QdrantVectorStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let client = Qdrant::from_url(&config.qdrant_url)
            .api_key(config.qdrant_api_key.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .with_context(|| format!("Failed to build Qdrant client for {}", config.qdrant_url))?;

        Ok(Self {
            client,
            collection: config.collection_name.clone(),
        })
    }

    async fn collection_exists(&self) -> Result<bool> {
        let collections = self
            .client
            .list_collections()
            .await
            .context("Failed to list Qdrant collections")?;
        Ok(collections
            .collections
            .iter()
            .any(|c| c.name == self.collection))
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        if self.collection_exists().await? {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .with_context(|| format!("Failed to create Qdrant collection {}", self.collection))?;

        tracing::info!(collection = %self.collection, dimensions, "Created Qdrant collection");
        Ok(())
    }
}

/// Name-based UUID for a chunk id, stable across index builds.
pub fn point_id(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, chunk_id.as_bytes()).to_string()
}

fn chunk_payload(chunk: &Chunk) -> serde_json::Value {
    serde_json::json!({
        "chunk_id": chunk.id,
        "document_id": chunk.document_id,
        "text": chunk.text,
        "source": chunk.metadata.source,
        "title": chunk.metadata.title,
        "url": chunk.metadata.url,
        "date": chunk.metadata.date,
    })
}

fn extract_string(payload: &HashMap<String, QdrantValue>, key: &str) -> String {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => s.clone(),
        _ => String::new(),
    }
}

fn chunk_from_payload(payload: &HashMap<String, QdrantValue>) -> Chunk {
    Chunk {
        id: extract_string(payload, "chunk_id"),
        document_id: extract_string(payload, "document_id"),
        text: extract_string(payload, "text"),
        metadata: ChunkMetadata {
            source: extract_string(payload, "source"),
            title: extract_string(payload, "title"),
            url: extract_string(payload, "url"),
            date: extract_string(payload, "date"),
        },
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn name(&self) -> &str {
        &self.collection
    }

    async fn upsert(&self, entries: Vec<VectorEntry>) -> Result<()> {
        let Some(first) = entries.first() else {
            return Ok(());
        };
        self.ensure_collection(first.embedding.len()).await?;

        let count = entries.len();
        let points = entries
            .into_iter()
            .map(|entry| {
                let payload = Payload::try_from(chunk_payload(&entry.chunk))
                    .context("Chunk payload is not a JSON object")?;
                Ok(PointStruct::new(
                    point_id(&entry.chunk.id),
                    entry.embedding,
                    payload,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .context("Failed to upsert points to Qdrant")?;

        tracing::debug!(collection = %self.collection, count, "Upserted chunks to Qdrant");
        Ok(())
    }

    async fn query(&self, embedding: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, embedding.to_vec(), limit as u64)
                    .with_payload(true),
            )
            .await
            .context("Failed to search Qdrant")?;

        let mut hits: Vec<VectorHit> = response
            .result
            .into_iter()
            .map(|scored| VectorHit {
                chunk: chunk_from_payload(&scored.payload),
                score: scored.score,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        Ok(hits)
    }

    async fn delete_collection(&self) -> Result<()> {
        if !self.collection_exists().await? {
            tracing::debug!(collection = %self.collection, "Qdrant collection absent, nothing to delete");
            return Ok(());
        }
        self.client
            .delete_collection(&self.collection)
            .await
            .with_context(|| format!("Failed to delete Qdrant collection {}", self.collection))?;
        tracing::info!(collection = %self.collection, "Deleted Qdrant collection");
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        if !self.collection_exists().await? {
            return Ok(0);
        }
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).exact(true))
            .await
            .context("Failed to count Qdrant points")?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }
}
