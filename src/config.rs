use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,
    /// Where the in-memory vector store persists its collections
    pub data_dir: PathBuf,
    /// CSV or JSON Lines file with crawled documents (only read by `build-index`)
    pub data_path: Option<PathBuf>,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Vector store backend configuration
    pub store: StoreConfig,
    /// Retrieval and re-ranking knobs
    pub retrieval: RetrievalConfig,
    /// Index-build chunking parameters
    pub chunking: ChunkingConfig,
    /// Agent loop configuration
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for reasoning, synthesis and re-rank judgments
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    /// Stop sequences sent with every completion request. Empty by
    /// default: a newline stop would cut ReAct replies after `Thought:`.
    pub stop: Vec<String>,
    /// Completion request timeout in seconds
    pub timeout_secs: u64,
    /// Embedding request timeout in seconds
    pub embed_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Qdrant,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => Ok(StoreBackend::Memory),
            "qdrant" => Ok(StoreBackend::Qdrant),
            other => Err(format!("unknown vector store backend: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Stable name of the collection holding the blog chunks
    pub collection_name: String,
    /// Qdrant gRPC endpoint, e.g. "http://localhost:6334"
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    /// Vector store request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Chunks fetched by direct similarity search (K)
    pub top_k: usize,
    /// Chunks fetched before tree summarization
    pub summary_top_k: usize,
    /// Character budget of one summarization prompt's context
    pub summary_context_chars: usize,
    /// Candidates judged per re-rank LLM call
    pub rerank_batch_size: usize,
    /// Candidates kept after re-ranking (N)
    pub rerank_top_n: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum words per chunk
    pub chunk_size: usize,
    /// Words shared between consecutive chunks of a document
    pub chunk_overlap: usize,
    /// Chunks embedded per embedding request
    pub embed_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on tool-selection + tool-execution cycles per turn
    pub max_reasoning_steps: usize,
    /// Maximum turns processed concurrently by the HTTP host
    pub max_concurrent_turns: usize,
    /// Messages of history kept per session
    pub max_history_messages: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            data_dir: PathBuf::from("./data"),
            data_path: None,
            llm: LlmConfig::default(),
            store: StoreConfig::default(),
            retrieval: RetrievalConfig::default(),
            chunking: ChunkingConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
            temperature: 0.5,
            max_tokens: 4000,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            stop: Vec::new(),
            timeout_secs: 60,
            embed_timeout_secs: 10,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            collection_name: "blog_posts".to_string(),
            qdrant_url: "http://localhost:6334".to_string(),
            qdrant_api_key: None,
            timeout_secs: 10,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            summary_top_k: 10,
            summary_context_chars: 6_000,
            rerank_batch_size: 5,
            rerank_top_n: 3,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256,
            chunk_overlap: 128,
            embed_batch_size: 32,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_reasoning_steps: 10,
            max_concurrent_turns: 3,
            max_history_messages: 10,
        }
    }
}

impl Config {
    /// Build the configuration from environment variables and validate it.
    ///
    /// Unset variables keep their defaults. A variable that is set but does
    /// not parse is an error, never silently ignored.
    pub fn from_env() -> Result<Self, PipelineError> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("RAG_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(dir) = std::env::var("RAG_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("RAG_DATA_PATH").or_else(|_| std::env::var("DATA_PATH")) {
            config.data_path = Some(PathBuf::from(path));
        }

        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        override_parsed("LLM_TEMPERATURE", &mut config.llm.temperature)?;
        override_parsed("LLM_MAX_TOKENS", &mut config.llm.max_tokens)?;
        override_parsed("LLM_TOP_P", &mut config.llm.top_p)?;
        override_parsed("LLM_FREQUENCY_PENALTY", &mut config.llm.frequency_penalty)?;
        override_parsed("LLM_PRESENCE_PENALTY", &mut config.llm.presence_penalty)?;
        if let Ok(stop) = std::env::var("LLM_STOP") {
            config.llm.stop = stop
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        override_parsed("LLM_TIMEOUT_SECS", &mut config.llm.timeout_secs)?;
        override_parsed("EMBEDDING_TIMEOUT_SECS", &mut config.llm.embed_timeout_secs)?;

        // Vector store
        override_parsed("VECTOR_STORE", &mut config.store.backend)?;
        if let Ok(name) = std::env::var("QDRANT_COLLECTION_NAME") {
            config.store.collection_name = name;
        }
        if let Ok(url) = std::env::var("QDRANT_URL") {
            config.store.qdrant_url = url;
        } else if let Ok(host) = std::env::var("QDRANT_HOST") {
            let port = std::env::var("QDRANT_PORT").unwrap_or_else(|_| "6334".to_string());
            config.store.qdrant_url = format!("http://{host}:{port}");
        }
        if let Ok(key) = std::env::var("QDRANT_API_KEY") {
            config.store.qdrant_api_key = Some(key);
        }
        override_parsed("QDRANT_TIMEOUT_SECS", &mut config.store.timeout_secs)?;

        // Retrieval
        override_parsed("RAG_TOP_K", &mut config.retrieval.top_k)?;
        override_parsed("RAG_SUMMARY_TOP_K", &mut config.retrieval.summary_top_k)?;
        override_parsed(
            "RAG_SUMMARY_CONTEXT_CHARS",
            &mut config.retrieval.summary_context_chars,
        )?;
        override_parsed("RERANK_BATCH_SIZE", &mut config.retrieval.rerank_batch_size)?;
        override_parsed("RERANK_TOP_N", &mut config.retrieval.rerank_top_n)?;

        // Chunking
        override_parsed("CHUNK_SIZE", &mut config.chunking.chunk_size)?;
        override_parsed("CHUNK_OVERLAP", &mut config.chunking.chunk_overlap)?;
        override_parsed("EMBED_BATCH_SIZE", &mut config.chunking.embed_batch_size)?;

        // Agent
        override_parsed("AGENT_MAX_STEPS", &mut config.agent.max_reasoning_steps)?;
        override_parsed(
            "RAG_MAX_CONCURRENT_TURNS",
            &mut config.agent.max_concurrent_turns,
        )?;
        override_parsed(
            "RAG_MAX_HISTORY_MESSAGES",
            &mut config.agent.max_history_messages,
        )?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::Config(msg));

        match self.llm.provider.as_str() {
            "ollama" | "openai" => {}
            other => return invalid(format!("unknown LLM provider: {other}")),
        }
        if self.llm.provider == "openai" && self.llm.api_key.is_none() {
            return invalid("LLM_API_KEY is required for the openai provider".into());
        }
        if self.store.collection_name.trim().is_empty() {
            return invalid("collection name must not be empty".into());
        }
        if self.retrieval.top_k == 0 || self.retrieval.summary_top_k == 0 {
            return invalid("top-k values must be at least 1".into());
        }
        if self.retrieval.rerank_batch_size == 0 || self.retrieval.rerank_top_n == 0 {
            return invalid("re-rank batch size and top-n must be at least 1".into());
        }
        if self.retrieval.summary_context_chars == 0 {
            return invalid("summary context budget must be at least 1 character".into());
        }
        if self.chunking.chunk_size == 0 || self.chunking.embed_batch_size == 0 {
            return invalid("chunk size and embed batch size must be at least 1".into());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return invalid(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            ));
        }
        if self.agent.max_reasoning_steps == 0 || self.agent.max_concurrent_turns == 0 {
            return invalid("agent step bound and turn concurrency must be at least 1".into());
        }
        if self.llm.timeout_secs == 0
            || self.llm.embed_timeout_secs == 0
            || self.store.timeout_secs == 0
        {
            return invalid("timeouts must be at least one second".into());
        }
        Ok(())
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.embed_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store.timeout_secs)
    }

    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }
}

fn override_parsed<T>(name: &str, target: &mut T) -> Result<(), PipelineError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = std::env::var(name) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| PipelineError::Config(format!("{name}={raw:?}: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_defaults_match_tuning_values() {
        let config = Config::default();
        assert_eq!(config.retrieval.rerank_batch_size, 5);
        assert_eq!(config.retrieval.rerank_top_n, 3);
        assert_eq!(config.chunking.chunk_size, 256);
        assert_eq!(config.chunking.chunk_overlap, 128);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut config = Config::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_openai_requires_api_key() {
        let mut config = Config::default();
        config.llm.provider = "openai".into();
        assert!(config.validate().is_err());
        config.llm.api_key = Some("sk-test".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut config = Config::default();
        config.llm.provider = "carrier-pigeon".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_step_bound_rejected() {
        let mut config = Config::default();
        config.agent.max_reasoning_steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_backend_from_str() {
        assert_eq!("memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert_eq!("Qdrant".parse::<StoreBackend>(), Ok(StoreBackend::Qdrant));
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_override_parsed_rejects_garbage() {
        // Unique variable name so parallel tests do not race on it.
        std::env::set_var("BLOG_RAG_TEST_GARBAGE_USIZE", "many");
        let mut value = 3usize;
        let result = override_parsed("BLOG_RAG_TEST_GARBAGE_USIZE", &mut value);
        std::env::remove_var("BLOG_RAG_TEST_GARBAGE_USIZE");
        assert!(result.is_err());
        assert_eq!(value, 3);
    }

    #[test]
    fn test_history_cap_read_from_env() {
        std::env::set_var("RAG_MAX_HISTORY_MESSAGES", "4");
        let config = Config::from_env();
        std::env::remove_var("RAG_MAX_HISTORY_MESSAGES");
        assert_eq!(config.unwrap().agent.max_history_messages, 4);
    }

    #[test]
    fn test_override_parsed_missing_keeps_default() {
        let mut value = 7usize;
        override_parsed("BLOG_RAG_TEST_UNSET_VARIABLE", &mut value).unwrap();
        assert_eq!(value, 7);
    }
}
