use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::llm::{truncate_to_char_boundary, Embedder};

/// Maximum characters sent per text to the embedding API. Chunks are ~256
/// words, so this only trims pathological inputs (tables, code dumps).
const MAX_EMBED_CHARS: usize = 3_000;

/// Embedding client for Ollama or OpenAI-compatible APIs.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: LlmConfig,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        let timeout = Duration::from_secs(config.embed_timeout_secs);
        Self {
            client,
            config,
            timeout,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let truncated: Vec<String> = texts
            .iter()
            .map(|t| truncate_to_char_boundary(t, MAX_EMBED_CHARS).to_string())
            .collect();

        let embeddings = match self.config.provider.as_str() {
            "ollama" => self.embed_ollama(&truncated).await?,
            "openai" => self.embed_openai(&truncated).await?,
            other => anyhow::bail!("Unknown LLM provider: {other}"),
        };

        if embeddings.len() != texts.len() {
            anyhow::bail!(
                "Embedding API returned {} vectors for {} inputs",
                embeddings.len(),
                texts.len()
            );
        }
        Ok(embeddings)
    }
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl HttpEmbedder {
    async fn embed_ollama(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.config.base_url);

        let req = OllamaEmbedRequest {
            model: self.config.embedding_model.clone(),
            input: texts.to_vec(),
            truncate: true,
        };

        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&req)
            .send()
            .await
            .context("Failed to call Ollama embed API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ollama embed API returned {status}: {body}");
        }

        let body: OllamaEmbedResponse = resp
            .json()
            .await
            .context("Failed to parse Ollama embed response")?;

        Ok(body.embeddings)
    }
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    async fn embed_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.config.base_url);
        let api_key = self.config.api_key.as_deref().unwrap_or_default();

        let req = OpenAiEmbedRequest {
            model: self.config.embedding_model.clone(),
            input: texts.to_vec(),
        };

        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&req)
            .send()
            .await
            .context("Failed to call OpenAI embed API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI embed API returned {status}: {body}");
        }

        let body: OpenAiEmbedResponse = resp
            .json()
            .await
            .context("Failed to parse OpenAI embed response")?;

        Ok(order_openai_embeddings(body.data))
    }
}

/// The OpenAI API tags each vector with its input position; do not rely on
/// response order.
fn order_openai_embeddings(mut data: Vec<OpenAiEmbedData>) -> Vec<Vec<f32>> {
    data.sort_by_key(|d| d.index);
    data.into_iter().map(|d| d.embedding).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_embeddings_reordered_by_index() {
        let body: OpenAiEmbedResponse = serde_json::from_str(
            r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#,
        )
        .unwrap();
        let ordered = order_openai_embeddings(body.data);
        assert_eq!(ordered, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_ollama_response_parses() {
        let body: OllamaEmbedResponse =
            serde_json::from_str(r#"{"model":"m","embeddings":[[0.1,0.2]]}"#).unwrap();
        assert_eq!(body.embeddings.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_request() {
        // Unroutable base URL: any request would fail.
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..LlmConfig::default()
        };
        let embedder = HttpEmbedder::new(reqwest::Client::new(), config);
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
    }
}
