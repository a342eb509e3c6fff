use std::sync::Arc;

use crate::agent::AgentController;
use crate::config::{Config, StoreBackend};
use crate::llm::completion::HttpCompletionModel;
use crate::llm::embeddings::HttpEmbedder;
use crate::llm::rerank::LlmReranker;
use crate::llm::{CompletionModel, Embedder};
use crate::search::qdrant::QdrantVectorStore;
use crate::search::{IndexSettings, InMemoryVectorStore, VectorIndex, VectorStore};
use crate::tools::ToolRegistry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub agent: AgentController,
    pub chat_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = http_client()?;
        let embedder: Arc<dyn Embedder> =
            Arc::new(HttpEmbedder::new(http_client.clone(), config.llm.clone()));
        let llm: Arc<dyn CompletionModel> =
            Arc::new(HttpCompletionModel::new(http_client, config.llm.clone()));
        let store = open_store(&config)?;

        let agent = build_agent(&config, embedder, store, llm);
        Ok(Self::with_agent(config, agent))
    }

    /// State around an already-assembled agent.
    pub fn with_agent(config: Config, agent: AgentController) -> Self {
        let max_turns = config.agent.max_concurrent_turns;
        Self {
            config,
            agent,
            chat_semaphore: Arc::new(tokio::sync::Semaphore::new(max_turns)),
        }
    }
}

/// Wire the serving pipeline: vector index, re-ranker, tools, controller.
pub fn build_agent(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn CompletionModel>,
) -> AgentController {
    let index = VectorIndex::new(
        embedder,
        store,
        llm.clone(),
        IndexSettings::from_config(config),
    );
    let reranker = LlmReranker::new(llm.clone(), config.retrieval.rerank_batch_size);
    let tools = ToolRegistry::new(index, reranker, llm.clone(), config.retrieval.rerank_top_n);
    AgentController::new(tools, llm, config.agent.max_reasoning_steps)
}

/// Open the configured vector store backend.
pub fn open_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(InMemoryVectorStore::open_or_create(
            &config.vector_dir(),
            &config.store.collection_name,
        )?),
        StoreBackend::Qdrant => Arc::new(QdrantVectorStore::new(&config.store)?),
    };
    Ok(store)
}

/// One client for every outbound call; per-request timeouts come from
/// [`LlmConfig`](crate::config::LlmConfig).
pub fn http_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_opens_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        let store = open_store(&config).unwrap();
        assert_eq!(store.name(), "blog_posts");
        assert!(dir.path().join("vectors").is_dir());
    }

    #[test]
    fn test_semaphore_sized_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        config.agent.max_concurrent_turns = 2;
        let state = AppState::new(config).unwrap();
        assert_eq!(state.chat_semaphore.available_permits(), 2);
    }
}
