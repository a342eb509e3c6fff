//! Query side of the vector index: direct similarity search and tree
//! summarization over the retrieved chunks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::llm::{sanitize_for_prompt, truncate_to_char_boundary, CompletionModel, Embedder};
use crate::models::Candidate;
use crate::search::vector::VectorStore;

/// Passage returned by a summarize search that retrieved nothing.
pub const NO_RELEVANT_PASSAGE: &str = "No relevant information was found in the indexed posts.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Top-K chunks with their similarity scores
    Direct,
    /// One passage synthesized from a broader retrieval
    Summarize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutput {
    Candidates(Vec<Candidate>),
    Passage(String),
}

#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub top_k: usize,
    pub summary_top_k: usize,
    pub summary_context_chars: usize,
    pub embed_timeout: Duration,
    pub store_timeout: Duration,
}

impl IndexSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            summary_top_k: config.retrieval.summary_top_k,
            summary_context_chars: config.retrieval.summary_context_chars,
            embed_timeout: config.embed_timeout(),
            store_timeout: config.store_timeout(),
        }
    }
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Read-only view of the chunk collection used while serving.
#[derive(Clone)]
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn CompletionModel>,
    settings: IndexSettings,
}

impl VectorIndex {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn CompletionModel>,
        settings: IndexSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            settings,
        }
    }

    pub fn collection(&self) -> &str {
        self.store.name()
    }

    pub async fn search(&self, query: &str, mode: SearchMode) -> Result<SearchOutput> {
        if query.trim().is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        match mode {
            SearchMode::Direct => {
                let candidates = self.retrieve(query, self.settings.top_k).await?;
                Ok(SearchOutput::Candidates(candidates))
            }
            SearchMode::Summarize => {
                let candidates = self.retrieve(query, self.settings.summary_top_k).await?;
                if candidates.is_empty() {
                    tracing::info!("Summarize search found no chunks");
                    return Ok(SearchOutput::Passage(NO_RELEVANT_PASSAGE.to_string()));
                }
                let texts = candidates.into_iter().map(|c| c.chunk.text).collect();
                let passage = self.tree_summarize(query, texts).await?;
                Ok(SearchOutput::Passage(passage))
            }
        }
    }

    /// Embed the query and fetch the `k` nearest chunks, highest similarity
    /// first.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Candidate>> {
        let embeddings = with_timeout("embedding", self.settings.embed_timeout, async {
            self.embedder.embed(&[query.to_string()]).await
        })
        .await?;
        let embedding = embeddings.into_iter().next().ok_or_else(|| {
            PipelineError::RetrievalUnavailable("embedding service returned no vector".into())
        })?;

        let hits = with_timeout("vector store", self.settings.store_timeout, async {
            self.store.query(&embedding, k).await
        })
        .await?;

        tracing::debug!(
            "Retrieved {} chunks from '{}' (k={k})",
            hits.len(),
            self.store.name()
        );

        Ok(hits
            .into_iter()
            .map(|hit| Candidate::new(hit.chunk, hit.score))
            .collect())
    }

    /// Summarize `texts` with respect to `query`, bottom-up: pack texts into
    /// prompt-sized groups, summarize each group, and repeat on the
    /// summaries until a single passage remains.
    async fn tree_summarize(&self, query: &str, mut texts: Vec<String>) -> Result<String> {
        let mut level = 0;
        loop {
            let groups = pack_groups(texts, self.settings.summary_context_chars);
            tracing::debug!("Tree summarization level {level}: {} groups", groups.len());

            let mut summaries = Vec::with_capacity(groups.len());
            for group in &groups {
                let prompt = summary_prompt(query, group);
                let summary = self
                    .llm
                    .complete(&prompt)
                    .await
                    .map_err(|e| PipelineError::Completion(format!("{e:#}")))?;
                summaries.push(summary.trim().to_string());
            }

            if summaries.len() == 1 {
                return Ok(summaries.remove(0));
            }
            texts = summaries;
            level += 1;
        }
    }
}

/// Run a retrieval-side call under `limit`. Both a timeout and a call error
/// mean the retrieval backend is unavailable.
async fn with_timeout<T, F>(what: &str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::warn!("{what} call failed: {e:#}");
            Err(PipelineError::RetrievalUnavailable(format!("{what}: {e:#}")))
        }
        Err(_) => {
            tracing::warn!("{what} call timed out after {limit:?}");
            Err(PipelineError::RetrievalUnavailable(format!(
                "{what} timed out after {limit:?}"
            )))
        }
    }
}

/// Split texts into groups whose combined length fits `budget` characters.
/// A group always takes at least two texts when two remain, so every level
/// of the tree has fewer nodes than the one below it.
fn pack_groups(texts: Vec<String>, budget: usize) -> Vec<Vec<String>> {
    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0;

    for text in texts {
        let text = truncate_to_char_boundary(&text, budget).to_string();
        if current.len() >= 2 && current_len + text.len() > budget {
            groups.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current_len += text.len();
        current.push(text);
    }

    if !current.is_empty() {
        // A trailing singleton joins the previous group.
        match groups.last_mut() {
            Some(last) if current.len() == 1 => last.append(&mut current),
            _ => groups.push(current),
        }
    }
    groups
}

fn summary_prompt(query: &str, group: &[String]) -> String {
    let context = group
        .iter()
        .map(|t| sanitize_for_prompt(t))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Context information from multiple sources is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the information from multiple sources and not prior knowledge, \
         answer the query.\n\
         Query: {query}\n\
         Answer: ",
        query = sanitize_for_prompt(query)
    )
}
