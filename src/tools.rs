//! The retrieval tools the agent can choose between.

use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::llm::rerank::LlmReranker;
use crate::llm::{sanitize_for_prompt, CompletionModel};
use crate::models::Candidate;
use crate::search::{SearchMode, SearchOutput, VectorIndex};

/// Fragment returned by `vector_search` when the index has nothing to offer.
pub const NOTHING_FOUND: &str = crate::search::index::NO_RELEVANT_PASSAGE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    VectorSearch,
    Summary,
}

impl Tool {
    pub const ALL: [Tool; 2] = [Tool::VectorSearch, Tool::Summary];

    pub fn name(self) -> &'static str {
        match self {
            Tool::VectorSearch => "vector_search",
            Tool::Summary => "summary",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Tool::VectorSearch => "useful for retrieving specific factual information.",
            Tool::Summary => "useful for summarizing information across multiple sources.",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        let name = name.trim().trim_matches('`').to_lowercase();
        Tool::ALL.into_iter().find(|t| t.name() == name)
    }
}

/// What a tool hands back to the agent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    /// Answer fragment shown to the agent as the observation
    pub text: String,
    /// Re-ranked chunks behind the fragment, best first
    pub sources: Vec<Candidate>,
    /// Re-ranking fell back to similarity order
    pub degraded: bool,
}

#[derive(Clone)]
pub struct ToolRegistry {
    index: VectorIndex,
    reranker: LlmReranker,
    llm: Arc<dyn CompletionModel>,
    top_n: usize,
}

impl ToolRegistry {
    pub fn new(
        index: VectorIndex,
        reranker: LlmReranker,
        llm: Arc<dyn CompletionModel>,
        top_n: usize,
    ) -> Self {
        Self {
            index,
            reranker,
            llm,
            top_n,
        }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub async fn invoke(&self, tool: Tool, query: &str) -> Result<ToolOutput> {
        tracing::info!("Invoking tool {} for query {query:?}", tool.name());
        let output = match tool {
            Tool::VectorSearch => self.vector_search(query).await?,
            Tool::Summary => self.summary(query).await?,
        };
        tracing::debug!(
            "Tool {} returned {} sources (degraded: {})",
            tool.name(),
            output.sources.len(),
            output.degraded
        );
        Ok(output)
    }

    async fn vector_search(&self, query: &str) -> Result<ToolOutput> {
        let candidates = match self.index.search(query, SearchMode::Direct).await? {
            SearchOutput::Candidates(candidates) => candidates,
            SearchOutput::Passage(text) => {
                return Ok(ToolOutput {
                    text,
                    ..ToolOutput::default()
                })
            }
        };
        if candidates.is_empty() {
            return Ok(ToolOutput {
                text: NOTHING_FOUND.to_string(),
                ..ToolOutput::default()
            });
        }

        let ranked = self.reranker.rerank(query, candidates, self.top_n).await;

        let prompt = answer_prompt(query, &ranked.candidates);
        let text = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|e| PipelineError::Completion(format!("{e:#}")))?;

        Ok(ToolOutput {
            text: text.trim().to_string(),
            sources: ranked.candidates,
            degraded: ranked.degraded,
        })
    }

    async fn summary(&self, query: &str) -> Result<ToolOutput> {
        let text = match self.index.search(query, SearchMode::Summarize).await? {
            SearchOutput::Passage(text) => text,
            SearchOutput::Candidates(_) => NOTHING_FOUND.to_string(),
        };
        Ok(ToolOutput {
            text,
            sources: Vec::new(),
            degraded: false,
        })
    }
}

fn answer_prompt(query: &str, sources: &[Candidate]) -> String {
    let context = sources
        .iter()
        .map(|c| {
            format!(
                "Title: {}\n{}",
                c.chunk.metadata.title,
                sanitize_for_prompt(&c.chunk.text)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Context information is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {query}\n\
         Answer: ",
        query = sanitize_for_prompt(query)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{IndexSettings, InMemoryVectorStore, VectorEntry, VectorStore};
    use crate::test_support::{chunk, hash_embed, HashEmbedder, ScriptedLlm};

    async fn registry(docs: &[(&str, &str)], llm: Arc<ScriptedLlm>) -> ToolRegistry {
        let store = Arc::new(InMemoryVectorStore::new("test"));
        let entries = docs
            .iter()
            .map(|(id, text)| VectorEntry {
                chunk: chunk(id, text),
                embedding: hash_embed(text),
            })
            .collect();
        store.upsert(entries).await.unwrap();

        let index = VectorIndex::new(
            Arc::new(HashEmbedder),
            store,
            llm.clone(),
            IndexSettings::default(),
        );
        ToolRegistry::new(index, LlmReranker::new(llm.clone(), 5), llm, 3)
    }

    fn judge_then_answer(prompt: &str) -> anyhow::Result<String> {
        if prompt.starts_with("A list of documents") {
            Ok("Doc: 2, Relevance: 9\nDoc: 1, Relevance: 4".into())
        } else if prompt.starts_with("Context information is below") {
            Ok(" Answer from context. ".into())
        } else {
            Ok("A summary.".into())
        }
    }

    #[test]
    fn test_tool_names_round_trip() {
        for tool in Tool::ALL {
            assert_eq!(Tool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(Tool::from_name(" Summary "), Some(Tool::Summary));
        assert_eq!(Tool::from_name("`vector_search`"), Some(Tool::VectorSearch));
        assert_eq!(Tool::from_name("web_search"), None);
    }

    #[tokio::test]
    async fn test_vector_search_returns_reranked_sources() {
        let llm = ScriptedLlm::new(judge_then_answer);
        let tools = registry(
            &[
                ("a-0", "vector stores index embeddings"),
                ("b-0", "vector stores answer similarity queries"),
            ],
            llm.clone(),
        )
        .await;

        let out = tools.invoke(Tool::VectorSearch, "vector stores").await.unwrap();
        assert_eq!(out.text, "Answer from context.");
        assert_eq!(out.sources.len(), 2);
        assert_eq!(out.sources[0].relevance, Some(9.0));
        assert!(!out.degraded);

        let prompts = llm.prompts.lock();
        let synthesis = prompts.last().unwrap();
        assert!(synthesis.contains("Query: vector stores"));
        assert!(synthesis.contains("Title: "));
    }

    #[tokio::test]
    async fn test_vector_search_degraded_judge_still_has_sources() {
        let llm = ScriptedLlm::new(|prompt| {
            if prompt.starts_with("A list of documents") {
                Err(anyhow::anyhow!("judge timed out"))
            } else {
                Ok("answer".into())
            }
        });
        let tools = registry(&[("a-0", "embeddings")], llm).await;

        let out = tools.invoke(Tool::VectorSearch, "embeddings").await.unwrap();
        assert!(out.degraded);
        assert_eq!(out.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_vector_search_on_empty_index_skips_llm() {
        let llm = ScriptedLlm::new(judge_then_answer);
        let tools = registry(&[], llm.clone()).await;

        let out = tools.invoke(Tool::VectorSearch, "anything").await.unwrap();
        assert_eq!(out.text, NOTHING_FOUND);
        assert!(out.sources.is_empty());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_summary_never_returns_sources() {
        let llm = ScriptedLlm::new(judge_then_answer);
        let tools = registry(
            &[("a-0", "embeddings one"), ("b-0", "embeddings two"), ("c-0", "embeddings three")],
            llm.clone(),
        )
        .await;

        let out = tools.invoke(Tool::Summary, "summarize embeddings").await.unwrap();
        assert_eq!(out.text, "A summary.");
        assert!(out.sources.is_empty());
        assert!(!out.degraded);
        // Summaries are not re-ranked
        assert!(llm
            .prompts
            .lock()
            .iter()
            .all(|p| !p.starts_with("A list of documents")));
    }

    #[tokio::test]
    async fn test_synthesis_failure_is_completion_error() {
        let llm = ScriptedLlm::new(|prompt| {
            if prompt.starts_with("Context information is below") {
                Err(anyhow::anyhow!("llm down"))
            } else {
                Ok("Doc: 1, Relevance: 5".into())
            }
        });
        let tools = registry(&[("a-0", "embeddings")], llm).await;
        assert!(matches!(
            tools.invoke(Tool::VectorSearch, "embeddings").await,
            Err(PipelineError::Completion(_))
        ));
    }
}
