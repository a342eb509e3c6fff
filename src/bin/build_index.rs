//! Rebuild the vector collection from the crawled posts at `RAG_DATA_PATH`.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use blog_rag::chunking::SentenceChunker;
use blog_rag::config::Config;
use blog_rag::indexing::{load_documents, IndexBuilder};
use blog_rag::llm::embeddings::HttpEmbedder;
use blog_rag::state::{http_client, open_store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("Invalid configuration")?;
    let data_path = config
        .data_path
        .clone()
        .context("RAG_DATA_PATH must point to the crawled posts (CSV or JSON Lines)")?;

    let documents = load_documents(&data_path)?;
    tracing::info!("Loaded {} documents from {}", documents.len(), data_path.display());

    let embedder = Arc::new(HttpEmbedder::new(http_client()?, config.llm.clone()));
    let store = open_store(&config)?;
    let chunker = SentenceChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap);

    let report = IndexBuilder::new(embedder, store, chunker, config.chunking.embed_batch_size)
        .build(&documents)
        .await?;

    tracing::info!(
        "Indexed {} documents as {} chunks; collection holds {} points",
        report.documents,
        report.chunks,
        report.points
    );
    Ok(())
}
